use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::ice::ice_credentials::IceCredentials;
use crate::stun::constants::TRANSACTION_ID_LEN;

/// Outstanding requests kept for response matching.
const MAX_OUTSTANDING: usize = 64;

/// Per-channel ICE check state: both credential pairs, the transaction ids
/// of requests still awaiting a response, and the one-shot selection flag.
#[derive(Debug)]
pub struct IceTransaction {
    pub local: IceCredentials,
    pub remote: IceCredentials,
    outstanding: Mutex<VecDeque<[u8; TRANSACTION_ID_LEN]>>,
    selected: AtomicBool,
}

impl IceTransaction {
    #[must_use]
    pub fn new(local: IceCredentials, remote: IceCredentials) -> Self {
        Self {
            local,
            remote,
            outstanding: Mutex::new(VecDeque::with_capacity(MAX_OUTSTANDING)),
            selected: AtomicBool::new(false),
        }
    }

    /// Remembers a sent request; the oldest id is dropped past the limit.
    pub fn remember(&self, id: [u8; TRANSACTION_ID_LEN]) {
        let mut q = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        if q.len() == MAX_OUTSTANDING {
            q.pop_front();
        }
        q.push_back(id);
    }

    /// Removes `id` if it was outstanding.
    pub fn take(&self, id: &[u8; TRANSACTION_ID_LEN]) -> bool {
        let mut q = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        match q.iter().position(|x| x == id) {
            Some(pos) => {
                q.remove(pos);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Sets the selection flag. Returns `true` only for the first caller.
    pub fn mark_selected(&self) -> bool {
        self.selected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn tx() -> IceTransaction {
        IceTransaction::new(IceCredentials::new("L", "lp"), IceCredentials::new("R", "rp"))
    }

    #[test]
    fn selection_flag_is_one_shot() {
        let t = tx();
        assert!(!t.is_selected());
        assert!(t.mark_selected());
        assert!(!t.mark_selected());
        assert!(t.is_selected());
    }

    #[test]
    fn outstanding_ids_are_bounded_and_matched_once() {
        let t = tx();
        for i in 0..(MAX_OUTSTANDING + 10) {
            let mut id = [0u8; 12];
            id[..8].copy_from_slice(&(i as u64).to_be_bytes());
            t.remember(id);
        }
        assert_eq!(t.outstanding_len(), MAX_OUTSTANDING);

        let mut oldest = [0u8; 12];
        oldest[..8].copy_from_slice(&0u64.to_be_bytes());
        assert!(!t.take(&oldest));

        let mut newest = [0u8; 12];
        newest[..8].copy_from_slice(&((MAX_OUTSTANDING + 9) as u64).to_be_bytes());
        assert!(t.take(&newest));
        assert!(!t.take(&newest));
    }
}
