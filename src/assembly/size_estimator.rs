//! Size estimation (§4.3) — sums the byte-cost model verbatim and converts
//! to the base64 wire size, checked against the hard limits (raw ≤ 1232,
//! base64 ≤ 1644).

pub const RAW_SIZE_LIMIT: usize = 1232;
pub const BASE64_SIZE_LIMIT: usize = 1644;

const FIXED_HEADER_BYTES: usize = 100;
const SIGNATURE_PREFIX_BYTES: usize = 68;
const COMPUTE_BUDGET_INSTRUCTION_BYTES: usize = 15;
const FLASH_LOAN_BASE_BYTES: usize = 30;
const FLASH_LOAN_INDEX_COUNT: usize = 14;
const FLASH_LOAN_DATA_BYTES: usize = 100;
const ALT_REF_BYTES: usize = 35;
const VERSIONED_OVERHEAD_BYTES: usize = 50;
const SAFETY_MARGIN: f64 = 1.05;
const BASE64_EXPANSION: f64 = 1.333;
const ALT_COMPRESSION_RATIO: f64 = 0.85;

/// Inputs to the size estimator, gathered from the compiled instructions of
/// both legs plus the flash-loan borrow/repay pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeEstimateInputs {
    /// Total instruction count across both legs (setup + main + cleanup),
    /// excluding compute-budget and flash-loan instructions which are
    /// priced separately.
    pub instruction_count: usize,
    /// Total account references across those same instructions.
    pub total_accounts: usize,
    /// Total instruction data bytes across those same instructions.
    pub total_data_bytes: usize,
    /// Distinct ALT addresses referenced by the compiled message.
    pub alt_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SizeEstimate {
    pub raw_bytes: usize,
    pub base64_bytes: usize,
}

impl SizeEstimate {
    pub fn fits(&self) -> bool {
        self.raw_bytes <= RAW_SIZE_LIMIT && self.base64_bytes <= BASE64_SIZE_LIMIT
    }
}

pub fn estimate_size(inputs: SizeEstimateInputs) -> SizeEstimate {
    let compressed = (inputs.total_accounts as f64 * ALT_COMPRESSION_RATIO).round() as usize;
    let compressed = compressed.min(inputs.total_accounts);
    let uncompressed = inputs.total_accounts - compressed;

    let account_bytes = compressed * 1
        + uncompressed * 32
        + inputs.total_accounts * 1 // is_writable flag per account
        + ((inputs.total_accounts as f64) / 2.0).ceil() as usize; // array overhead

    let raw_sum = FIXED_HEADER_BYTES
        + SIGNATURE_PREFIX_BYTES
        + 2 * COMPUTE_BUDGET_INSTRUCTION_BYTES
        + FLASH_LOAN_BASE_BYTES
        + FLASH_LOAN_INDEX_COUNT
        + FLASH_LOAN_DATA_BYTES
        + inputs.instruction_count // one programId index byte per instruction
        + account_bytes
        + inputs.total_data_bytes
        + inputs.alt_count * ALT_REF_BYTES
        + VERSIONED_OVERHEAD_BYTES;

    let raw_bytes = (raw_sum as f64 * SAFETY_MARGIN).ceil() as usize;
    let base64_bytes = (raw_bytes as f64 * BASE64_EXPANSION).ceil() as usize;

    SizeEstimate {
        raw_bytes,
        base64_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_inputs_still_pay_fixed_costs() {
        let estimate = estimate_size(SizeEstimateInputs::default());
        assert!(estimate.raw_bytes > 0);
        assert!(estimate.fits());
    }

    #[test]
    fn base64_is_larger_than_raw() {
        let estimate = estimate_size(SizeEstimateInputs {
            instruction_count: 4,
            total_accounts: 20,
            total_data_bytes: 200,
            alt_count: 2,
        });
        assert!(estimate.base64_bytes > estimate.raw_bytes);
    }

    proptest! {
        #[test]
        fn monotonic_in_accounts(
            base_accounts in 0usize..50,
            extra in 1usize..50,
            instructions in 0usize..10,
            data in 0usize..500,
            alts in 0usize..10,
        ) {
            let low = estimate_size(SizeEstimateInputs {
                instruction_count: instructions,
                total_accounts: base_accounts,
                total_data_bytes: data,
                alt_count: alts,
            });
            let high = estimate_size(SizeEstimateInputs {
                instruction_count: instructions,
                total_accounts: base_accounts + extra,
                total_data_bytes: data,
                alt_count: alts,
            });
            prop_assert!(high.raw_bytes >= low.raw_bytes);
        }

        #[test]
        fn monotonic_in_data_size(
            accounts in 0usize..50,
            base_data in 0usize..500,
            extra in 1usize..500,
            instructions in 0usize..10,
            alts in 0usize..10,
        ) {
            let low = estimate_size(SizeEstimateInputs {
                instruction_count: instructions,
                total_accounts: accounts,
                total_data_bytes: base_data,
                alt_count: alts,
            });
            let high = estimate_size(SizeEstimateInputs {
                instruction_count: instructions,
                total_accounts: accounts,
                total_data_bytes: base_data + extra,
                alt_count: alts,
            });
            prop_assert!(high.raw_bytes >= low.raw_bytes);
        }

        #[test]
        fn monotonic_in_alt_count(
            accounts in 0usize..50,
            data in 0usize..500,
            base_alts in 0usize..10,
            extra in 1usize..10,
            instructions in 0usize..10,
        ) {
            let low = estimate_size(SizeEstimateInputs {
                instruction_count: instructions,
                total_accounts: accounts,
                total_data_bytes: data,
                alt_count: base_alts,
            });
            let high = estimate_size(SizeEstimateInputs {
                instruction_count: instructions,
                total_accounts: accounts,
                total_data_bytes: data,
                alt_count: base_alts + extra,
            });
            prop_assert!(high.raw_bytes >= low.raw_bytes);
        }
    }
}
