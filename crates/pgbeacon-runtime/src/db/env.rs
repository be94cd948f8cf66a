use std::collections::BTreeMap;
use std::fmt;

use super::params::ENV_KEYS;

/// Snapshot of the libpq `PG*` variables, taken out of the process
/// environment.
///
/// sqlx reads several of these variables whenever it builds connect
/// options, and some (password, certificates, `PGOPTIONS`) cannot be
/// overridden afterwards. Once captured they reach a connection only
/// through [`ConnectionParams::resolve`](super::ConnectionParams::resolve).
#[derive(Clone, Default)]
pub struct PgEnvironment {
    vars: BTreeMap<String, String>,
}

impl PgEnvironment {
    /// Move every libpq variable out of the process environment.
    ///
    /// Call before any other thread is started.
    pub fn capture() -> Self {
        let mut vars = BTreeMap::new();
        for (var, _) in ENV_KEYS {
            if let Some(value) = std::env::var_os(var) {
                std::env::remove_var(var);
                match value.into_string() {
                    Ok(value) => {
                        vars.insert(var.to_string(), value);
                    }
                    Err(_) => tracing::warn!(var, "Ignoring non UTF-8 environment variable"),
                }
            }
        }
        Self { vars }
    }

    /// Build from explicit variables instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a captured variable.
    pub fn get(&self, var: &str) -> Option<String> {
        self.vars.get(var).cloned()
    }
}

impl fmt::Debug for PgEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConnectionParams;

    #[test]
    fn test_capture_moves_variables_out_of_process() {
        let _guard = crate::db::PROCESS_ENV.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("PGSSLCERT", "/etc/pgbeacon/client.pem");

        let env = PgEnvironment::capture();

        assert!(std::env::var_os("PGSSLCERT").is_none());
        assert_eq!(
            env.get("PGSSLCERT").as_deref(),
            Some("/etc/pgbeacon/client.pem")
        );
    }

    #[test]
    fn test_resolves_through_snapshot() {
        let env = PgEnvironment::from_vars([("PGUSER", "monitor"), ("PGPASSWORD", "hunter2")]);
        let params = ConnectionParams::resolve("host=db1", |var| env.get(var)).unwrap();
        assert_eq!(params.user.as_deref(), Some("monitor"));
        assert_eq!(params.host.as_deref(), Some("db1"));

        let out = format!("{:?}", env);
        assert!(out.contains("PGPASSWORD"));
        assert!(!out.contains("hunter2"));
    }
}
