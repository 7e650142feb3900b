//! Bearer-token authentication for mutating routes: when no API key is
//! configured, every request passes; when one is, mutating routes must carry
//! a matching `Authorization: Bearer <key>` header.

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Clone, Debug, Default)]
pub struct ApiKey(pub Option<String>);

impl ApiKey {
    pub fn from_env() -> Self {
        Self(std::env::var("AGENTGATE_API_KEY").ok())
    }

    /// `true` if `header` (the raw `Authorization` header value, if present)
    /// is acceptable. No key configured means every request is accepted.
    pub fn verify(&self, header: Option<&str>) -> bool {
        let Some(expected) = &self.0 else {
            return true;
        };
        let Some(header) = header else {
            return false;
        };
        let Some(provided) = header.strip_prefix("Bearer ") else {
            return false;
        };
        constant_time_eq(expected.as_bytes(), provided.as_bytes())
    }
}
