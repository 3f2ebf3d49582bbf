/// Returns the bus name of a node name.
///
/// Removes the first `.` that is immediately followed by a phase digit
/// (`1`, `2` or `3`). Only one suffix is removed, so `650.1` becomes `650`
/// and a name without a phase suffix is returned unchanged.
pub fn bus_name(node: &str) -> String {
    let bytes = node.as_bytes();
    let found = bytes
        .windows(2)
        .position(|w| w[0] == b'.' && matches!(w[1], b'1'..=b'3'));
    match found {
        Some(i) => [&node[..i], &node[i + 2..]].concat(),
        None => node.to_string(),
    }
}

/// Maps every node name to its bus name, preserving order.
pub fn bus_names(nodes: &[String]) -> Vec<String> {
    nodes.iter().map(|n| bus_name(n)).collect()
}

/// Formats the name of phase `phase` at `bus`.
pub fn node_name(bus: &str, phase: u8) -> String {
    format!("{}.{}", bus, phase)
}
