//! Shared CLI helpers used across multiple commands.

use std::path::Path;

use anyhow::Context;
use cadence_config::Topology;
use cadence_core::Graph;

/// Loads a topology file and builds its completed graph.
pub fn load_graph(path: &Path) -> anyhow::Result<(Topology, Graph)> {
    let topology = Topology::load(path)?;
    let graph = topology
        .build()
        .with_context(|| format!("topology '{}' does not build", path.display()))?;
    Ok((topology, graph))
}

/// Formats a byte count for humans.
pub fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(768), "768 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
