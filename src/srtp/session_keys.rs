use crate::srtp::constants::{SESSION_AUTH_LEN, SESSION_KEY_LEN, SESSION_SALT_LEN};

/// Keys produced by the key derivation function. Never mutated after derivation.
pub struct SessionKeys {
    pub(crate) enc_key: [u8; SESSION_KEY_LEN],
    pub(crate) auth_key: [u8; SESSION_AUTH_LEN],
    pub(crate) salt: [u8; SESSION_SALT_LEN],
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.enc_key.fill(0);
        self.auth_key.fill(0);
        self.salt.fill(0);
    }
}
