use std::io;

use crate::error::Error;

/// Attach-time configuration, stored as a TOML document
///
/// Entries are addressed by dotted paths, so `filter0.dst_port` looks up the
/// `dst_port` key of the `[filter0]` table.
#[derive(Clone, Debug)]
pub struct Config {
    value: toml::Value,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            value: toml::Value::Table(toml::map::Map::new()),
        }
    }
}

impl Config {
    /// Get a raw entry by path. If the input argument contains dots, the path is split
    /// into keys, each key being requested recursively.
    pub fn get_value<T: AsRef<str>>(&self, k: T) -> Option<&toml::Value> {
        let mut item = &self.value;
        for key in k.as_ref().split('.') {
            item = item.get(key)?;
        }
        Some(item)
    }

    /// Get an entry of type string by path
    pub fn get<T: AsRef<str>>(&self, k: T) -> Option<&str> {
        self.get_value(k)?.as_str()
    }

    /// Get an entry of type integer by path
    pub fn get_usize<T: AsRef<str>>(&self, k: T) -> Option<usize> {
        self.get_value(k)?
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Get an entry of type boolean by path
    ///
    /// Integers are accepted as well, only `1` meaning `true`.
    pub fn get_bool<T: AsRef<str>>(&self, k: T) -> Option<bool> {
        match self.get_value(k)? {
            toml::Value::Boolean(b) => Some(*b),
            toml::Value::Integer(i) => Some(*i == 1),
            _ => None,
        }
    }

    /// Set an entry by path, creating intermediate tables if needed
    ///
    /// An existing entry of the same name is replaced. Setting a path below a
    /// non-table value replaces that value with a table.
    pub fn set<T, V>(&mut self, k: T, v: V)
    where
        T: AsRef<str>,
        V: Into<toml::Value>,
    {
        let mut keys = k.as_ref().split('.').peekable();
        let mut item = &mut self.value;
        while let Some(key) = keys.next() {
            if !item.is_table() {
                *item = toml::Value::Table(toml::map::Map::new());
            }
            let table = match item.as_table_mut() {
                Some(table) => table,
                None => return,
            };
            if keys.peek().is_none() {
                table.insert(key.to_owned(), v.into());
                return;
            }
            item = table
                .entry(key.to_owned())
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        }
    }

    /// Load configuration from input object. Previous content is replaced.
    pub fn load_config<R: io::Read>(&mut self, mut config: R) -> Result<(), Error> {
        let mut s = String::new();
        config.read_to_string(&mut s)?;
        let table = toml::from_str::<toml::Table>(&s).map_err(|e| Error::Config(e.to_string()))?;
        self.value = toml::Value::Table(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn dotted_lookup() {
        let mut config = Config::default();
        config
            .load_config(
                r#"
                num_threads = 4
                log_file = "ifstat.log"

                [filter0]
                enabled = true
                dst_port = 443
                "#
                .as_bytes(),
            )
            .unwrap();
        assert_eq!(config.get_usize("num_threads"), Some(4));
        assert_eq!(config.get("log_file"), Some("ifstat.log"));
        assert_eq!(config.get_bool("filter0.enabled"), Some(true));
        assert_eq!(config.get_usize("filter0.dst_port"), Some(443));
        assert!(config.get_value("filter1.dst_port").is_none());
        assert!(config.get("num_threads").is_none());
    }

    #[test]
    fn set_creates_tables() {
        let mut config = Config::default();
        config.set("num_threads", 2);
        config.set("filter3.enabled", true);
        config.set("filter3.src_ip", "10.0.0.1");
        assert_eq!(config.get_usize("num_threads"), Some(2));
        assert_eq!(config.get_bool("filter3.enabled"), Some(true));
        assert_eq!(config.get("filter3.src_ip"), Some("10.0.0.1"));
        // overwrite
        config.set("num_threads", 8);
        assert_eq!(config.get_usize("num_threads"), Some(8));
    }

    #[test]
    fn integer_as_bool() {
        let mut config = Config::default();
        config.set("FILTER1_ENABLED", 1);
        config.set("FILTER2_ENABLED", 0);
        config.set("FILTER3_ENABLED", 2);
        assert_eq!(config.get_bool("FILTER1_ENABLED"), Some(true));
        assert_eq!(config.get_bool("FILTER2_ENABLED"), Some(false));
        assert_eq!(config.get_bool("FILTER3_ENABLED"), Some(false));
    }

    #[test]
    fn negative_is_not_usize() {
        let mut config = Config::default();
        config.set("num_threads", -1);
        assert_eq!(config.get_usize("num_threads"), None);
    }

    #[test]
    fn invalid_document() {
        let mut config = Config::default();
        assert!(config.load_config("[filter0".as_bytes()).is_err());
    }
}
