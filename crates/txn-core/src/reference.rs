//! Reference data tables used by the generator.
//!
//! The four tables are loaded once at startup from JSON array files and are
//! read-only for the rest of the process. Lookups the generator needs on the
//! hot path (agents grouped by master agent) are indexed at load time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const CURRENCIES: &str = "currencies";
const CURRENCY_RATES: &str = "currency_rates";
const AGENTS: &str = "agents";
const GAME_CATEGORIES: &str = "game_categories";

/// Errors that can occur while loading reference data.
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// Table file missing or unreadable.
    #[error("Failed to read {table} table from {}: {source}", path.display())]
    Read {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Table file is not a JSON array of the expected record type.
    #[error("Failed to parse {table} table from {}: {source}", path.display())]
    Parse {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A table that generation depends on has no rows.
    ///
    /// `path` is set when the table was read from a file.
    #[error("Reference table '{table}' is empty{}", source_suffix(path.as_deref()))]
    Empty {
        table: &'static str,
        path: Option<PathBuf>,
    },
}

fn source_suffix(path: Option<&Path>) -> String {
    path.map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

/// A currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: i32,
    pub code: String,
    pub name: String,
}

/// A currency conversion rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub id: i32,
    pub currency_from: String,
    pub currency_from_id: i32,
    pub currency_to: String,
    pub currency_to_id: i32,
    pub rate: Decimal,
    /// Unix timestamp (seconds) from which the rate applies.
    pub effective_from: i64,
    pub status: i32,
}

/// An agent, always owned by exactly one master agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i32,
    pub sas_entity_id: i32,
    pub master_agent_id: i32,
    pub status: i32,
    #[serde(default)]
    pub notification_enabled: Option<i32>,
}

/// A game category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCategory {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub status: i32,
}

/// Locations of the four reference table files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePaths {
    pub currencies: PathBuf,
    pub currency_rates: PathBuf,
    pub agents: PathBuf,
    pub game_categories: PathBuf,
}

impl ReferencePaths {
    /// Paths using the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            currencies: dir.join("currencies.json"),
            currency_rates: dir.join("currency_rates.json"),
            agents: dir.join("agents.json"),
            game_categories: dir.join("game_categories.json"),
        }
    }

    /// File holding `table`, if it is one of the four known tables.
    pub fn for_table(&self, table: &str) -> Option<&Path> {
        match table {
            CURRENCIES => Some(&self.currencies),
            CURRENCY_RATES => Some(&self.currency_rates),
            AGENTS => Some(&self.agents),
            GAME_CATEGORIES => Some(&self.game_categories),
            _ => None,
        }
    }
}

/// The four parsed tables, before indexing.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub currencies: Vec<Currency>,
    pub currency_rates: Vec<CurrencyRate>,
    pub agents: Vec<Agent>,
    pub game_categories: Vec<GameCategory>,
}

impl ReferenceTables {
    /// Read and parse all four tables.
    pub fn from_files(paths: &ReferencePaths) -> Result<Self, DataLoadError> {
        Ok(Self {
            currencies: read_table(CURRENCIES, &paths.currencies)?,
            currency_rates: read_table(CURRENCY_RATES, &paths.currency_rates)?,
            agents: read_table(AGENTS, &paths.agents)?,
            game_categories: read_table(GAME_CATEGORIES, &paths.game_categories)?,
        })
    }
}

fn empty(table: &'static str) -> DataLoadError {
    DataLoadError::Empty { table, path: None }
}

fn read_table<T: serde::de::DeserializeOwned>(
    table: &'static str,
    path: &Path,
) -> Result<Vec<T>, DataLoadError> {
    let content = fs::read(path).map_err(|source| DataLoadError::Read {
        table,
        path: path.to_path_buf(),
        source,
    })?;
    let rows: Vec<T> = serde_json::from_slice(&content).map_err(|source| DataLoadError::Parse {
        table,
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded {} rows from {} table", rows.len(), table);
    Ok(rows)
}

/// Indexed, immutable reference data.
///
/// Shared between generator workers behind an `Arc`; nothing is added,
/// removed or mutated after construction.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    currencies: Vec<Currency>,
    currency_rates: Vec<CurrencyRate>,
    agents: Vec<Agent>,
    game_categories: Vec<GameCategory>,

    currency_by_id: HashMap<i32, usize>,
    rates_by_source: HashMap<i32, Vec<usize>>,
    agents_by_master: HashMap<i32, Vec<Agent>>,
    /// Sorted so that uniform group selection is stable for a given seed.
    master_agent_ids: Vec<i32>,
}

impl ReferenceData {
    /// Load and index reference data from the given files.
    pub fn load(paths: &ReferencePaths) -> Result<Self, DataLoadError> {
        Self::from_tables(ReferenceTables::from_files(paths)?).map_err(|e| match e {
            DataLoadError::Empty { table, path: None } => DataLoadError::Empty {
                table,
                path: paths.for_table(table).map(Path::to_path_buf),
            },
            other => other,
        })
    }

    /// Validate and index already-parsed tables.
    pub fn from_tables(tables: ReferenceTables) -> Result<Self, DataLoadError> {
        let ReferenceTables {
            currencies,
            currency_rates,
            agents,
            game_categories,
        } = tables;

        if currencies.is_empty() {
            return Err(empty(CURRENCIES));
        }
        if agents.is_empty() {
            return Err(empty(AGENTS));
        }
        if game_categories.is_empty() {
            return Err(empty(GAME_CATEGORIES));
        }

        let currency_by_id: HashMap<i32, usize> = currencies
            .iter()
            .enumerate()
            .map(|(idx, currency)| (currency.id, idx))
            .collect();

        let mut rates_by_source: HashMap<i32, Vec<usize>> = HashMap::new();
        let mut dangling = HashSet::new();
        for (idx, rate) in currency_rates.iter().enumerate() {
            for id in [rate.currency_from_id, rate.currency_to_id] {
                if !currency_by_id.contains_key(&id) {
                    dangling.insert(id);
                }
            }
            rates_by_source
                .entry(rate.currency_from_id)
                .or_default()
                .push(idx);
        }
        if !dangling.is_empty() {
            warn!(
                "Currency rates reference {} currency id(s) missing from the currency table: {:?}",
                dangling.len(),
                dangling
            );
        }

        let mut agents_by_master: HashMap<i32, Vec<Agent>> = HashMap::new();
        for agent in &agents {
            agents_by_master
                .entry(agent.master_agent_id)
                .or_default()
                .push(agent.clone());
        }
        let mut master_agent_ids: Vec<i32> = agents_by_master.keys().copied().collect();
        master_agent_ids.sort_unstable();

        Ok(Self {
            currencies,
            currency_rates,
            agents,
            game_categories,
            currency_by_id,
            rates_by_source,
            agents_by_master,
            master_agent_ids,
        })
    }

    pub fn currencies(&self) -> &[Currency] {
        &self.currencies
    }

    pub fn currency_rates(&self) -> &[CurrencyRate] {
        &self.currency_rates
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn game_categories(&self) -> &[GameCategory] {
        &self.game_categories
    }

    /// Look up a currency by id.
    pub fn currency_by_id(&self, id: i32) -> Option<&Currency> {
        self.currency_by_id.get(&id).map(|&idx| &self.currencies[idx])
    }

    /// All rates converting from the given currency id.
    pub fn rates_from(&self, currency_id: i32) -> impl Iterator<Item = &CurrencyRate> {
        self.rates_by_source
            .get(&currency_id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.currency_rates[idx])
    }

    /// Distinct master agent ids, sorted ascending. Never empty.
    pub fn master_agent_ids(&self) -> &[i32] {
        &self.master_agent_ids
    }

    /// Agents belonging to a master agent. Non-empty for every id in
    /// [`master_agent_ids`](Self::master_agent_ids).
    pub fn agents_for_master(&self, master_agent_id: i32) -> &[Agent] {
        self.agents_by_master
            .get(&master_agent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tables() -> ReferenceTables {
        ReferenceTables {
            currencies: vec![
                Currency {
                    id: 1,
                    code: "USD".to_string(),
                    name: "US Dollar".to_string(),
                },
                Currency {
                    id: 2,
                    code: "BTC".to_string(),
                    name: "Bitcoin".to_string(),
                },
            ],
            currency_rates: vec![CurrencyRate {
                id: 1,
                currency_from: "BTC".to_string(),
                currency_from_id: 2,
                currency_to: "USD".to_string(),
                currency_to_id: 1,
                rate: Decimal::new(6500000, 0),
                effective_from: 1_700_000_000,
                status: 1,
            }],
            agents: vec![
                agent(11, 1),
                agent(12, 1),
                agent(21, 2),
            ],
            game_categories: vec![GameCategory {
                id: 1,
                code: "SLOT".to_string(),
                name: "Slots".to_string(),
                status: 1,
            }],
        }
    }

    fn agent(id: i32, master_agent_id: i32) -> Agent {
        Agent {
            id,
            sas_entity_id: 1,
            master_agent_id,
            status: 1,
            notification_enabled: None,
        }
    }

    #[test]
    fn test_indices_built() {
        let data = ReferenceData::from_tables(tables()).unwrap();

        assert_eq!(data.master_agent_ids(), &[1, 2]);
        assert_eq!(data.agents_for_master(1).len(), 2);
        assert_eq!(data.agents_for_master(2)[0].id, 21);
        assert!(data.agents_for_master(99).is_empty());
        assert_eq!(data.currency_by_id(2).unwrap().code, "BTC");
        assert_eq!(data.rates_from(2).count(), 1);
        assert_eq!(data.rates_from(1).count(), 0);
    }

    #[test]
    fn test_every_agent_indexed_under_its_master() {
        let data = ReferenceData::from_tables(tables()).unwrap();
        for master in data.master_agent_ids() {
            for agent in data.agents_for_master(*master) {
                assert_eq!(agent.master_agent_id, *master);
            }
        }
        let indexed: usize = data
            .master_agent_ids()
            .iter()
            .map(|m| data.agents_for_master(*m).len())
            .sum();
        assert_eq!(indexed, data.agents().len());
    }

    #[test]
    fn test_empty_agents_is_fatal() {
        let mut t = tables();
        t.agents.clear();
        assert!(matches!(
            ReferenceData::from_tables(t),
            Err(DataLoadError::Empty {
                table: "agents",
                path: None
            })
        ));
    }

    #[test]
    fn test_empty_file_names_path() {
        let dir = TempDir::new().unwrap();
        let paths = ReferencePaths::in_dir(dir.path());
        let t = tables();
        fs::write(&paths.currencies, serde_json::to_vec(&t.currencies).unwrap()).unwrap();
        fs::write(&paths.currency_rates, "[]").unwrap();
        fs::write(&paths.agents, "[]").unwrap();
        fs::write(
            &paths.game_categories,
            serde_json::to_vec(&t.game_categories).unwrap(),
        )
        .unwrap();

        let err = ReferenceData::load(&paths).unwrap_err();
        match &err {
            DataLoadError::Empty { table, path } => {
                assert_eq!(*table, "agents");
                assert_eq!(path.as_deref(), Some(paths.agents.as_path()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("agents.json"));
    }

    #[test]
    fn test_empty_rates_allowed() {
        let mut t = tables();
        t.currency_rates.clear();
        assert!(ReferenceData::from_tables(t).is_ok());
    }

    #[test]
    fn test_load_from_files() {
        let dir = TempDir::new().unwrap();
        let paths = ReferencePaths::in_dir(dir.path());
        let t = tables();
        fs::write(&paths.currencies, serde_json::to_vec(&t.currencies).unwrap()).unwrap();
        fs::write(
            &paths.currency_rates,
            r#"[{"id":1,"currency_from":"BTC","currency_from_id":2,"currency_to":"USD",
                 "currency_to_id":1,"rate":65000.25,"effective_from":1700000000,"status":1}]"#,
        )
        .unwrap();
        fs::write(&paths.agents, serde_json::to_vec(&t.agents).unwrap()).unwrap();
        fs::write(
            &paths.game_categories,
            serde_json::to_vec(&t.game_categories).unwrap(),
        )
        .unwrap();

        let data = ReferenceData::load(&paths).unwrap();
        assert_eq!(data.currencies().len(), 2);
        assert_eq!(data.currency_rates()[0].rate, Decimal::new(6500025, 2));
    }

    #[test]
    fn test_missing_file_names_table_and_path() {
        let dir = TempDir::new().unwrap();
        let paths = ReferencePaths::in_dir(dir.path());

        let err = ReferenceData::load(&paths).unwrap_err();
        assert!(matches!(err, DataLoadError::Read { table: "currencies", .. }));
        assert!(err.to_string().contains("currencies.json"));
    }

    #[test]
    fn test_malformed_rate_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = ReferencePaths::in_dir(dir.path());
        let t = tables();
        fs::write(&paths.currencies, serde_json::to_vec(&t.currencies).unwrap()).unwrap();
        // rate must be numeric
        fs::write(
            &paths.currency_rates,
            r#"[{"id":1,"currency_from":"BTC","currency_from_id":2,"currency_to":"USD",
                 "currency_to_id":1,"rate":true,"effective_from":1700000000,"status":1}]"#,
        )
        .unwrap();

        let err = ReferenceData::load(&paths).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::Parse {
                table: "currency_rates",
                ..
            }
        ));
    }
}
