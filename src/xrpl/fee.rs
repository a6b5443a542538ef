//! Multisigned transaction fees

/// Largest signer list the bridge account supports
pub const MAX_ALLOWED_XRPL_SIGNERS: u64 = 32;

/// Flat fee (in drops) for a multisigned transaction.
///
/// A multisigned transaction costs `base_fee * (1 + signatures)`; the fee is
/// fixed at the maximum signer count so every relayer signs the same bytes.
pub fn multisigning_fee(xrpl_base_fee: u64) -> u64 {
    xrpl_base_fee.saturating_mul(1 + MAX_ALLOWED_XRPL_SIGNERS)
}

/// Base fee scaled by the server load (`server_state` load_factor / load_base)
pub fn compute_base_fee(base_fee: u64, load_factor: u64, load_base: u64) -> u64 {
    if load_base == 0 {
        return base_fee;
    }
    let scaled = u128::from(base_fee) * u128::from(load_factor) / u128::from(load_base);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multisigning_fee() {
        assert_eq!(multisigning_fee(10), 330);
        assert_eq!(multisigning_fee(0), 0);
        assert_eq!(multisigning_fee(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_compute_base_fee() {
        assert_eq!(compute_base_fee(10, 256, 256), 10);
        assert_eq!(compute_base_fee(10, 512, 256), 20);
        assert_eq!(compute_base_fee(10, 384, 256), 15);
        assert_eq!(compute_base_fee(10, 256, 0), 10);
    }
}
