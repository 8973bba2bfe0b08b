//! Deterministic stand-ins for external collaborators.

use crate::auth::{AuthAlgorithm, AuthVector, UsimData, AUTH_PARAM_LEN};
use crate::error::AuthError;

/// Toy authentication algorithm: XOR of the challenge with the USIM keys.
///
/// The sequence number is read big-endian from the first eight bytes of AUTN.
/// Not a real AKA computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorAuthAlgorithm;

impl AuthAlgorithm for XorAuthAlgorithm {
    fn authenticate(
        &self,
        usim: &UsimData,
        rand: &[u8; AUTH_PARAM_LEN],
        autn: &[u8; AUTH_PARAM_LEN],
    ) -> Result<AuthVector, AuthError> {
        let mut sqn = [0u8; 8];
        sqn.copy_from_slice(&autn[..8]);
        let xor = |key: &[u8; AUTH_PARAM_LEN], rot: usize| {
            let mut out = [0u8; AUTH_PARAM_LEN];
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = rand[i] ^ key[(i + rot) % AUTH_PARAM_LEN];
            }
            out
        };
        let res = xor(&usim.key, 0)[..8].to_vec();
        Ok(AuthVector {
            res,
            ck: xor(&usim.opc, 0),
            ik: xor(&usim.key, 1),
            sqn: u64::from_be_bytes(sqn),
        })
    }
}
