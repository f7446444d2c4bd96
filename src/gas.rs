//! Gas calculator (C11): intrinsic per-byte gas plus a TTL surcharge,
//! both overflow-checked end to end.

use thiserror::Error;

use crate::config::ChainConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GasError {
    #[error("gas calculation overflowed")]
    Overflow,
    #[error("ttl surcharge overflowed")]
    TtlOverflow,
}

/// `base + Σ(zero_byte ? gas_per_zero_byte : gas_per_nonzero_byte)`.
pub fn intrinsic_gas(cfg: &ChainConfig, data: &[u8]) -> Result<u64, GasError> {
    let mut total = cfg.tx_base_gas;
    for &b in data {
        let per_byte = if b == 0 { cfg.gas_per_zero_byte } else { cfg.gas_per_nonzero_byte };
        total = total.checked_add(per_byte).ok_or(GasError::Overflow)?;
    }
    Ok(total)
}

/// `ttl * per_block_ttl_gas`, its own overflow kind since a huge TTL is a
/// caller-controlled value distinct from payload-size overflow.
pub fn ttl_surcharge(cfg: &ChainConfig, ttl: u64) -> Result<u64, GasError> {
    ttl.checked_mul(cfg.per_block_ttl_gas).ok_or(GasError::TtlOverflow)
}

/// `intrinsic_gas(data) + ttl_surcharge(ttl)`, used by the KV-router path.
pub fn intrinsic_with_ttl(cfg: &ChainConfig, data: &[u8], ttl: u64) -> Result<u64, GasError> {
    let intrinsic = intrinsic_gas(cfg, data)?;
    let surcharge = ttl_surcharge(cfg, ttl)?;
    intrinsic.checked_add(surcharge).ok_or(GasError::Overflow)
}

/// `intrinsic_gas(data) + sys_action_gas`, used by the system-action path.
pub fn sys_action_gas(cfg: &ChainConfig, data: &[u8]) -> Result<u64, GasError> {
    let intrinsic = intrinsic_gas(cfg, data)?;
    intrinsic.checked_add(cfg.sys_action_gas).ok_or(GasError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_gas_charges_more_for_nonzero_bytes() {
        let cfg = ChainConfig::default();
        let zero = intrinsic_gas(&cfg, &[0u8; 10]).unwrap();
        let nonzero = intrinsic_gas(&cfg, &[1u8; 10]).unwrap();
        assert!(nonzero > zero);
        assert_eq!(zero, cfg.tx_base_gas + 10 * cfg.gas_per_zero_byte);
    }

    #[test]
    fn ttl_surcharge_overflows_near_u64_max() {
        let cfg = ChainConfig::default();
        assert!(matches!(ttl_surcharge(&cfg, u64::MAX), Err(GasError::TtlOverflow)));
        assert!(ttl_surcharge(&cfg, 1_000).is_ok());
    }

    #[test]
    fn intrinsic_gas_overflows_when_base_is_near_u64_max() {
        let mut cfg = ChainConfig::default();
        cfg.tx_base_gas = u64::MAX - 1;
        assert!(matches!(intrinsic_gas(&cfg, &[1u8; 4]), Err(GasError::Overflow)));
    }

    #[test]
    fn sys_action_gas_adds_fixed_surcharge() {
        let cfg = ChainConfig::default();
        let data = b"{}";
        let expected = intrinsic_gas(&cfg, data).unwrap() + cfg.sys_action_gas;
        assert_eq!(sys_action_gas(&cfg, data).unwrap(), expected);
    }
}
