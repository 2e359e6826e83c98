//! Deterministic global sample key (C3, §4.3, §3 invariant 7).

/// `p = ceil(log10(samples_per_shard))`, matching Python's
/// `math.ceil(math.log10(n))` including the powers-of-ten edge case
/// (`log10(1000) == 3` exactly, so `p == 3`, not `4`).
pub fn p_digits(samples_per_shard: u64) -> u32 {
    let n = samples_per_shard.max(1);
    let mut p = n.ilog10();
    if 10u64.pow(p) < n {
        p += 1;
    }
    p
}

/// `zero_pad(shard_id * 10^p + row_index, width = p + q)`.
pub fn format_key(shard_id: u64, row_index: u64, p: u32, q: u32) -> String {
    let true_key = shard_id * 10u64.pow(p) + row_index;
    let width = (p + q) as usize;
    format!("{true_key:0width$}")
}
