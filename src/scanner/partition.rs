// =============================================================================
// Partition manager — which symbols this worker owns
// =============================================================================
//
// Uses the same `sha256(symbol) mod worker_count` hash as the stream bus, so
// a worker's owned symbols always line up with the bus partition it would
// need to read ticks/bars from for those same symbols.

use crate::bus::partition_for;

pub struct PartitionManager {
    worker_id: u32,
    worker_count: u32,
}

impl PartitionManager {
    pub fn new(worker_id: u32, worker_count: u32) -> Self {
        assert!(worker_count > 0, "worker_count must be positive");
        assert!(worker_id < worker_count, "worker_id must be < worker_count");
        Self {
            worker_id,
            worker_count,
        }
    }

    pub fn owns(&self, symbol: &str) -> bool {
        partition_for(symbol, self.worker_count) == self.worker_id
    }

    pub fn owned_symbols<'a>(&self, universe: &'a [String]) -> Vec<&'a str> {
        universe
            .iter()
            .filter(|s| self.owns(s))
            .map(|s| s.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<String> {
        [
            "BTCUSDT", "ETHUSDT", "BNBUSDT", "XRPUSDT", "SOLUSDT", "DOGEUSDT", "ADAUSDT",
            "MATICUSDT", "DOTUSDT", "LTCUSDT",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    #[test]
    fn every_symbol_is_owned_by_exactly_one_worker() {
        let universe = universe();
        let workers: Vec<PartitionManager> =
            (0..4).map(|id| PartitionManager::new(id, 4)).collect();

        for symbol in &universe {
            let owners: usize = workers.iter().filter(|w| w.owns(symbol)).count();
            assert_eq!(owners, 1, "symbol {symbol} should have exactly one owner");
        }
    }

    #[test]
    fn owned_symbols_partitions_the_universe_without_overlap() {
        let universe = universe();
        let workers: Vec<PartitionManager> =
            (0..3).map(|id| PartitionManager::new(id, 3)).collect();

        let mut all_owned: Vec<&str> = Vec::new();
        for w in &workers {
            all_owned.extend(w.owned_symbols(&universe));
        }
        all_owned.sort_unstable();
        let mut expected: Vec<&str> = universe.iter().map(|s| s.as_str()).collect();
        expected.sort_unstable();
        assert_eq!(all_owned, expected);
    }

    #[test]
    fn single_worker_owns_everything() {
        let w = PartitionManager::new(0, 1);
        for symbol in universe() {
            assert!(w.owns(&symbol));
        }
    }

    #[test]
    #[should_panic]
    fn rejects_worker_id_out_of_range() {
        PartitionManager::new(4, 4);
    }
}
