use rand::{Rng, rngs::OsRng};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Short-term ICE credentials (`a=ice-ufrag` / `a=ice-pwd`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

impl IceCredentials {
    pub fn new(ufrag: impl Into<String>, pwd: impl Into<String>) -> Self {
        Self {
            ufrag: ufrag.into(),
            pwd: pwd.into(),
        }
    }

    /// Fresh random credentials. ICE requires ufrag >= 4 chars and pwd >= 22 chars.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(gen_token(8), gen_token(24))
    }
}

fn gen_token(len: usize) -> String {
    let mut s = String::with_capacity(len);
    for _ in 0..len {
        let idx = OsRng.gen_range(0..ALPHABET.len());
        s.push(ALPHABET[idx] as char);
    }
    s
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn generated_credentials_meet_minimum_lengths() {
        let c = IceCredentials::generate();
        assert_eq!(c.ufrag.len(), 8);
        assert_eq!(c.pwd.len(), 24);
        assert!(c.ufrag.bytes().all(|b| ALPHABET.contains(&b)));
        assert_ne!(IceCredentials::generate(), c);
    }
}
