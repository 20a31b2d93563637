use anyhow::Result;
use rand::Rng;

use crate::KeyValueStore;

pub const SESSION_ID_KEY: &str = "moneybird_session_id";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// `sess-` followed by nine lowercase base-36 characters.
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("sess-{suffix}")
}

/// Reuse the id already stored for this browsing session, or mint and store a
/// new one.
pub async fn load_or_create_session_id(store: &dyn KeyValueStore) -> Result<String> {
    if let Some(existing) = store.get(SESSION_ID_KEY).await? {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_owned());
        }
    }

    let id = generate_session_id();
    store.set(SESSION_ID_KEY, &id).await?;
    tracing::debug!(session_id = %id, "created new chat session id");
    Ok(id)
}
