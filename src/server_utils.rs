const MAX_NODE_ID_LEN: usize = 64;

pub fn sanitize_node_id(value: &str) -> String {
    value.trim().chars().take(MAX_NODE_ID_LEN).collect()
}

/// Seeds wrap into `u32`; negative values count from the top.
pub fn normalize_seed(value: Option<i64>) -> Option<u32> {
    value.map(|seed| seed.rem_euclid(1_i64 << 32) as u32)
}

/// Non-finite or negative distances are dropped.
pub fn normalize_distance(value: Option<f64>) -> Option<f32> {
    value
        .filter(|distance| distance.is_finite() && *distance >= 0.0)
        .map(|distance| distance as f32)
}

pub fn session_order_key(session_id: &str) -> u64 {
    session_id
        .rsplit('_')
        .next()
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

pub fn parse_activity_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}
