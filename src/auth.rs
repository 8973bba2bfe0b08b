//! Crypto bridge.
//!
//! Reads the challenge from scenario variables, hands it to an external
//! [`AuthAlgorithm`] together with the scenario's USIM data, then writes the
//! response back into variables and advances the USIM sequence number. The
//! primitives themselves live outside this crate.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Fault, VarError};
use crate::item::AuthBindings;
use crate::value::{VarType, VarValue};
use crate::vars::VariableStore;

/// Length of RAND, AUTN, CK and IK.
pub const AUTH_PARAM_LEN: usize = 16;

/// Subscriber identity and long-term key material of an emulated USIM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsimData {
    /// Subscriber identity.
    #[serde(default)]
    pub imsi: String,
    /// Subscriber key K.
    #[serde(default)]
    pub key: [u8; AUTH_PARAM_LEN],
    /// Operator variant key OPc.
    #[serde(default)]
    pub opc: [u8; AUTH_PARAM_LEN],
    /// Initial sequence number.
    #[serde(default)]
    pub sqn: u64,
}

/// Per-scenario authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// USIM the scenario emulates.
    pub usim: UsimData,
    /// Highest sequence number accepted so far.
    pub sqn: u64,
}

impl AuthContext {
    /// Context seeded from USIM data.
    #[must_use]
    pub fn new(usim: UsimData) -> Self {
        let sqn = usim.sqn;
        Self { usim, sqn }
    }
}

/// Output of one authentication computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVector {
    /// Response RES.
    pub res: Vec<u8>,
    /// Cipher key.
    pub ck: [u8; AUTH_PARAM_LEN],
    /// Integrity key.
    pub ik: [u8; AUTH_PARAM_LEN],
    /// Sequence number recovered from AUTN.
    pub sqn: u64,
}

/// External authentication algorithm.
pub trait AuthAlgorithm: Send + Sync {
    /// Compute the response to a network challenge.
    ///
    /// # Errors
    ///
    /// [`AuthError::Algorithm`] if the challenge cannot be verified.
    fn authenticate(
        &self,
        usim: &UsimData,
        rand: &[u8; AUTH_PARAM_LEN],
        autn: &[u8; AUTH_PARAM_LEN],
    ) -> Result<AuthVector, AuthError>;
}

impl<T: AuthAlgorithm + ?Sized> AuthAlgorithm for &T {
    fn authenticate(
        &self,
        usim: &UsimData,
        rand: &[u8; AUTH_PARAM_LEN],
        autn: &[u8; AUTH_PARAM_LEN],
    ) -> Result<AuthVector, AuthError> {
        (**self).authenticate(usim, rand, autn)
    }
}

fn read_param(vars: &VariableStore, name: &str) -> Result<[u8; AUTH_PARAM_LEN], Fault> {
    let value = vars.get(name)?;
    let bytes = value.as_bytes().ok_or_else(|| AuthError::InvalidLength {
        name: name.to_string(),
        expected: AUTH_PARAM_LEN,
        found: 0,
    })?;
    let param = <[u8; AUTH_PARAM_LEN]>::try_from(bytes).map_err(|_| AuthError::InvalidLength {
        name: name.to_string(),
        expected: AUTH_PARAM_LEN,
        found: bytes.len(),
    })?;
    Ok(param)
}

/// Run the authentication algorithm on the bound challenge variables.
///
/// On success RES, CK and IK are written through the store (notifying their
/// subscribers) and `ctx.sqn` advances to the challenge's sequence number.
///
/// # Errors
///
/// [`AuthError::InvalidLength`] for malformed challenge material,
/// [`AuthError::StaleSequence`] if the sequence number is not fresh, or the
/// algorithm's own error. Variable faults surface as [`Fault::Variable`].
/// Nothing is written on error.
pub fn compute_authentication_response(
    ctx: &mut AuthContext,
    vars: &mut VariableStore,
    bindings: &AuthBindings,
    algorithm: &dyn AuthAlgorithm,
) -> Result<AuthVector, Fault> {
    let rand = read_param(vars, &bindings.rand)?;
    let autn = read_param(vars, &bindings.autn)?;
    let vector = algorithm.authenticate(&ctx.usim, &rand, &autn)?;
    if vector.sqn <= ctx.sqn {
        return Err(AuthError::StaleSequence {
            received: vector.sqn,
            current: ctx.sqn,
        }
        .into());
    }
    for name in [&bindings.res, &bindings.ck, &bindings.ik] {
        // Type-check every output before writing any of them.
        let ty = vars.var_type(name)?;
        if ty.is_numeric() {
            return Err(VarError::TypeMismatch {
                name: name.clone(),
                expected: ty,
                found: VarType::Bytes,
            }
            .into());
        }
    }
    vars.set(&bindings.res, VarValue::Bytes(vector.res.clone()))?;
    vars.set(&bindings.ck, VarValue::Bytes(vector.ck.to_vec()))?;
    vars.set(&bindings.ik, VarValue::Bytes(vector.ik.to_vec()))?;
    tracing::debug!(imsi = %ctx.usim.imsi, from = ctx.sqn, to = vector.sqn, "usim sequence advanced");
    ctx.sqn = vector.sqn;
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemUid;
    use crate::testing::XorAuthAlgorithm;
    use assert_matches::assert_matches;

    fn store(rand: Vec<u8>, autn: Vec<u8>) -> VariableStore {
        let mut vars = VariableStore::new();
        vars.declare("RAND", VarType::Bytes, Some(VarValue::Bytes(rand)))
            .unwrap();
        vars.declare("AUTN", VarType::Bytes, Some(VarValue::Bytes(autn)))
            .unwrap();
        for name in ["RES", "CK", "IK"] {
            vars.declare(name, VarType::Bytes, None).unwrap();
        }
        vars
    }

    fn autn_with_sqn(sqn: u64) -> Vec<u8> {
        let mut autn = vec![0u8; AUTH_PARAM_LEN];
        autn[..8].copy_from_slice(&sqn.to_be_bytes());
        autn
    }

    #[test]
    fn test_writes_outputs_and_advances_sqn() {
        let mut ctx = AuthContext::new(UsimData {
            imsi: "001010000000001".into(),
            sqn: 3,
            ..UsimData::default()
        });
        let mut vars = store(vec![7; 16], autn_with_sqn(4));
        vars.subscribe("RES", ItemUid::from_raw(9)).unwrap();
        vars.clear_dirty(ItemUid::from_raw(9));

        let vector = compute_authentication_response(
            &mut ctx,
            &mut vars,
            &AuthBindings::default(),
            &XorAuthAlgorithm,
        )
        .unwrap();

        assert_eq!(ctx.sqn, 4);
        assert_eq!(vars.get("RES").unwrap(), &VarValue::Bytes(vector.res));
        assert_eq!(vars.get("CK").unwrap().as_bytes().map(<[u8]>::len), Some(16));
        assert!(vars.is_dirty(ItemUid::from_raw(9)));
    }

    #[test]
    fn test_short_rand_is_rejected() {
        let mut ctx = AuthContext::default();
        let mut vars = store(vec![1; 8], autn_with_sqn(1));
        let err = compute_authentication_response(
            &mut ctx,
            &mut vars,
            &AuthBindings::default(),
            &XorAuthAlgorithm,
        )
        .unwrap_err();
        assert_matches!(
            err,
            Fault::Auth(AuthError::InvalidLength { expected: 16, found: 8, .. })
        );
        assert_eq!(vars.get("RES").unwrap(), &VarValue::Bytes(Vec::new()));
    }

    #[test]
    fn test_replayed_sequence_is_stale() {
        let mut ctx = AuthContext::new(UsimData {
            sqn: 5,
            ..UsimData::default()
        });
        let mut vars = store(vec![0; 16], autn_with_sqn(5));
        let err = compute_authentication_response(
            &mut ctx,
            &mut vars,
            &AuthBindings::default(),
            &XorAuthAlgorithm,
        )
        .unwrap_err();
        assert_matches!(
            err,
            Fault::Auth(AuthError::StaleSequence { received: 5, current: 5 })
        );
        assert_eq!(ctx.sqn, 5);
    }
}
