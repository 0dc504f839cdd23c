//! Shamir splitting of the 32-byte data key.
//!
//! Share `i` (1-based x-coordinate) is wrapped for the i-th key server listed
//! in the encrypted object. Any `threshold` unwrapped shares rebuild the key;
//! fewer reveal nothing about it.

use std::collections::HashSet;

use sharks::{Share, Sharks};

use crate::error::CryptoError;

/// One Shamir share of a data key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShare {
    /// x-coordinate, never 0.
    pub index: u8,
    pub data: [u8; 32],
}

impl KeyShare {
    fn to_sharks_share(&self) -> Result<Share, CryptoError> {
        let mut bytes = Vec::with_capacity(33);
        bytes.push(self.index);
        bytes.extend_from_slice(&self.data);
        Share::try_from(bytes.as_slice()).map_err(|e| CryptoError::ShareCombine(e.to_string()))
    }

    fn from_sharks_share(share: &Share) -> Result<Self, CryptoError> {
        let bytes: Vec<u8> = share.into();
        if bytes.len() != 33 || bytes[0] == 0 {
            return Err(CryptoError::ShareSplit(format!(
                "unexpected share encoding of {} bytes",
                bytes.len()
            )));
        }
        let mut data = [0u8; 32];
        data.copy_from_slice(&bytes[1..]);
        Ok(Self {
            index: bytes[0],
            data,
        })
    }
}

/// Split `key` into `total` shares with indices `1..=total`.
pub fn split_key(key: &[u8; 32], threshold: u8, total: u8) -> Result<Vec<KeyShare>, CryptoError> {
    if threshold == 0 || threshold > total {
        return Err(CryptoError::ShareSplit(format!(
            "threshold {threshold} out of range for {total} shares"
        )));
    }
    let dealer = Sharks(threshold).dealer(key);
    let shares = dealer
        .take(total as usize)
        .map(|s| KeyShare::from_sharks_share(&s))
        .collect::<Result<Vec<_>, _>>()?;
    if shares.len() != total as usize {
        return Err(CryptoError::ShareSplit(format!(
            "expected {} shares, got {}",
            total,
            shares.len()
        )));
    }
    Ok(shares)
}

/// Rebuild the key from at least `threshold` shares.
///
/// Recovery succeeds for any well-formed input; only the object's integrity
/// tag tells a right key from a wrong one.
pub fn combine_key(shares: &[KeyShare], threshold: u8) -> Result<[u8; 32], CryptoError> {
    if shares.len() < threshold as usize {
        return Err(CryptoError::NotEnoughShares {
            required: threshold as usize,
            provided: shares.len(),
        });
    }

    let mut seen = HashSet::new();
    for share in shares {
        if !seen.insert(share.index) {
            return Err(CryptoError::DuplicateShareIndex(share.index));
        }
    }

    let sharks_shares = shares
        .iter()
        .map(KeyShare::to_sharks_share)
        .collect::<Result<Vec<_>, _>>()?;
    let secret = Sharks(threshold)
        .recover(&sharks_shares)
        .map_err(|e| CryptoError::ShareCombine(e.to_string()))?;

    <[u8; 32]>::try_from(secret.as_slice()).map_err(|_| {
        CryptoError::ShareCombine(format!("expected 32-byte key, got {}", secret.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_indices_are_one_based() {
        let shares = split_key(&[9u8; 32], 2, 3).unwrap();
        let indices: Vec<u8> = shares.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_any_two_of_three_recover() {
        let key = [0x5Au8; 32];
        let shares = split_key(&key, 2, 3).unwrap();
        for pair in [[0, 1], [0, 2], [1, 2]] {
            let subset = vec![shares[pair[0]].clone(), shares[pair[1]].clone()];
            assert_eq!(combine_key(&subset, 2).unwrap(), key);
        }
    }

    #[test]
    fn test_one_share_is_not_enough() {
        let shares = split_key(&[1u8; 32], 2, 3).unwrap();
        assert_eq!(
            combine_key(&shares[..1], 2),
            Err(CryptoError::NotEnoughShares {
                required: 2,
                provided: 1
            })
        );
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let shares = split_key(&[1u8; 32], 2, 3).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone()];
        assert_eq!(combine_key(&dup, 2), Err(CryptoError::DuplicateShareIndex(1)));
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(split_key(&[0u8; 32], 0, 3).is_err());
        assert!(split_key(&[0u8; 32], 4, 3).is_err());
    }

    #[test]
    fn test_tampered_share_gives_different_key() {
        let key = [0x33u8; 32];
        let mut shares = split_key(&key, 2, 2).unwrap();
        shares[1].data[0] ^= 0xFF;
        assert_ne!(combine_key(&shares, 2).unwrap(), key);
    }
}
