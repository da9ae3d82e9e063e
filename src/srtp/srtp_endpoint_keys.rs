/// Master key and salt for one direction of a session, as exported by DTLS.
#[derive(Clone)]
pub struct SrtpEndpointKeys {
    pub master_key: Vec<u8>,
    pub master_salt: Vec<u8>,
}

impl std::fmt::Debug for SrtpEndpointKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrtpEndpointKeys")
            .field("master_key", &format_args!("<{} bytes>", self.master_key.len()))
            .field("master_salt", &format_args!("<{} bytes>", self.master_salt.len()))
            .finish()
    }
}
