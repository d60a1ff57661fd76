use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Reserved key under which the identity lives in entry data.
pub const NAVIGATION_KEY: &str = "navigation";

const KEY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const KEY_LEN: usize = 8;

/// Identity of one history entry: a random key plus its position index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavigationIdentity {
    pub key: String,
    pub index: i64,
}

impl NavigationIdentity {
    pub fn new(key: impl Into<String>, index: i64) -> Self {
        Self {
            key: key.into(),
            index,
        }
    }

    /// Identity reported before any entry has been stamped.
    pub fn unknown() -> Self {
        Self {
            key: String::new(),
            index: -1,
        }
    }

    pub fn generate(index: i64) -> Self {
        Self {
            key: generate_key(),
            index,
        }
    }

    pub fn is_known(&self) -> bool {
        self.index >= 0
    }

    /// Reads the identity stored in an entry's data, if any.
    pub fn from_state(state: &Value) -> Option<Self> {
        let raw = state.get(NAVIGATION_KEY)?;
        serde_json::from_value(raw.clone()).ok()
    }
}

impl Default for NavigationIdentity {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Random base36 token, unique enough to tell entries at the same index apart.
pub fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    (0..KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Merges `identity` into `state` under [`NAVIGATION_KEY`]. Non-object states
/// are discarded in favour of a fresh object.
pub fn stamp(state: Value, identity: &NavigationIdentity) -> Value {
    let mut map = match state {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert(
        NAVIGATION_KEY.to_string(),
        json!({ "key": identity.key, "index": identity.index }),
    );
    Value::Object(map)
}
