use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::Url;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use pgbeacon_core::error::{BeaconError, Result};

/// Application name reported to the server when none is configured.
pub const DEFAULT_APPLICATION_NAME: &str = "pgbeacon";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;

/// Directories searched for the server socket when no host is given.
const DEFAULT_SOCKET_DIRS: &[&str] = &["/var/run/postgresql", "/private/tmp", "/tmp"];

/// Environment variables read by [`ConnectionParams::from_env`], with the
/// connection key each one sets.
pub(crate) const ENV_KEYS: &[(&str, &str)] = &[
    ("PGHOST", "host"),
    ("PGHOSTADDR", "hostaddr"),
    ("PGPORT", "port"),
    ("PGDATABASE", "dbname"),
    ("PGUSER", "user"),
    ("PGPASSWORD", "password"),
    ("PGSSLMODE", "sslmode"),
    ("PGSSLROOTCERT", "sslrootcert"),
    ("PGSSLCERT", "sslcert"),
    ("PGSSLKEY", "sslkey"),
    ("PGAPPNAME", "application_name"),
    ("PGCONNECT_TIMEOUT", "connect_timeout"),
    ("PGOPTIONS", "options"),
    ("PGTARGETSESSIONATTRS", "target_session_attrs"),
];

/// Client-side keywords sqlx has no setting for. They are accepted and
/// dropped with a warning; none of them is ever sent to the server.
const UNSUPPORTED_CLIENT_KEYS: &[&str] = &[
    "channel_binding",
    "gssdelegation",
    "gssencmode",
    "gsslib",
    "keepalives",
    "keepalives_count",
    "keepalives_idle",
    "keepalives_interval",
    "krbsrvname",
    "load_balance_hosts",
    "passfile",
    "require_auth",
    "requirepeer",
    "service",
    "ssl_max_protocol_version",
    "ssl_min_protocol_version",
    "sslcompression",
    "sslcrl",
    "sslcrldir",
    "sslnegotiation",
    "sslpassword",
    "sslsni",
    "target_session_attrs",
    "tcp_user_timeout",
];

/// PostgreSQL connection parameters before defaults are applied.
///
/// Every field is optional so that two sources can be merged field by field.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: Option<String>,
    /// Numeric address, used instead of `host` when both are set.
    pub hostaddr: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub sslmode: Option<String>,
    pub ssl_root_cert: Option<String>,
    pub ssl_client_cert: Option<String>,
    pub ssl_client_key: Option<String>,
    pub application_name: Option<String>,
    pub fallback_application_name: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Server settings, from `options` or from keys libpq does not know.
    pub runtime_params: BTreeMap<String, String>,
}

impl ConnectionParams {
    /// Parse a connection string.
    ///
    /// Accepts a `postgres://` / `postgresql://` URL or libpq style
    /// `key=value` pairs. An empty string yields empty parameters.
    pub fn from_conn_str(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Self::from_url(s)
        } else {
            Self::from_key_values(s)
        }
    }

    /// Read the libpq `PG*` environment variables through `lookup`.
    pub fn from_env<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut params = Self::default();
        for (var, key) in ENV_KEYS {
            if let Some(value) = lookup(var) {
                params
                    .set(key, value)
                    .map_err(|e| format!("{}: {}", var, e))?;
            }
        }
        Ok(params)
    }

    /// Combine the connection string with the environment.
    ///
    /// When both parse, explicit values win over environment values field
    /// by field. When only one parses it is used alone. When neither
    /// parses, startup cannot continue.
    pub fn resolve<F>(conn_str: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match (Self::from_conn_str(conn_str), Self::from_env(lookup)) {
            (Ok(explicit), Ok(env)) => Ok(explicit.merged_over(env)),
            (Ok(explicit), Err(env_err)) => {
                tracing::warn!(error = %env_err, "Ignoring invalid PG* environment settings");
                Ok(explicit)
            }
            (Err(conn_err), Ok(env)) => {
                tracing::warn!(
                    error = %conn_err,
                    "Ignoring invalid connection string, using PG* environment settings"
                );
                Ok(env)
            }
            (Err(conn_err), Err(env_err)) => Err(BeaconError::InvalidConnectionParameters(
                format!("connection string: {}; environment: {}", conn_err, env_err),
            )),
        }
    }

    /// Fill every unset field of `self` from `base`.
    pub fn merged_over(self, base: Self) -> Self {
        let mut runtime_params = base.runtime_params;
        runtime_params.extend(self.runtime_params);

        Self {
            host: self.host.or(base.host),
            hostaddr: self.hostaddr.or(base.hostaddr),
            port: self.port.or(base.port),
            user: self.user.or(base.user),
            password: self.password.or(base.password),
            dbname: self.dbname.or(base.dbname),
            sslmode: self.sslmode.or(base.sslmode),
            ssl_root_cert: self.ssl_root_cert.or(base.ssl_root_cert),
            ssl_client_cert: self.ssl_client_cert.or(base.ssl_client_cert),
            ssl_client_key: self.ssl_client_key.or(base.ssl_client_key),
            application_name: self.application_name.or(base.application_name),
            fallback_application_name: self
                .fallback_application_name
                .or(base.fallback_application_name),
            connect_timeout: self.connect_timeout.or(base.connect_timeout),
            runtime_params,
        }
    }

    /// Build sqlx connect options.
    ///
    /// Host, port, user, database, sslmode and application name are always
    /// set, with libpq's defaults for the unset ones, so sqlx's own `PG*`
    /// reads cannot override them. Password, certificates and server
    /// options can only be added; [`PgEnvironment::capture`] keeps the
    /// process environment from supplying them. `~/.pgpass` is not consulted.
    ///
    /// [`PgEnvironment::capture`]: super::PgEnvironment::capture
    pub fn to_connect_options(&self) -> Result<PgConnectOptions> {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let user = self.user.clone().unwrap_or_else(whoami::username);
        let ssl_mode = match &self.sslmode {
            Some(mode) => PgSslMode::from_str(mode)
                .map_err(|e| BeaconError::InvalidConnectionParameters(e.to_string()))?,
            None => PgSslMode::Prefer,
        };
        let application_name = self
            .application_name
            .as_deref()
            .or(self.fallback_application_name.as_deref())
            .unwrap_or(DEFAULT_APPLICATION_NAME);

        let mut options = PgConnectOptions::new_without_pgpass()
            .host(DEFAULT_HOST)
            .port(port)
            .username(&user)
            .database(self.dbname.as_deref().unwrap_or(&user))
            .ssl_mode(ssl_mode)
            .application_name(application_name);

        match self.hostaddr.as_deref().or(self.host.as_deref()) {
            Some(dir) if dir.starts_with('/') => options = options.socket(dir),
            Some(host) => options = options.host(host),
            None => {
                if let Some(dir) = default_socket_dir(port) {
                    options = options.socket(dir);
                }
            }
        }

        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(path) = &self.ssl_root_cert {
            options = options.ssl_root_cert(path);
        }
        if let Some(path) = &self.ssl_client_cert {
            options = options.ssl_client_cert(path);
        }
        if let Some(path) = &self.ssl_client_key {
            options = options.ssl_client_key(path);
        }

        if !self.runtime_params.is_empty() {
            options = options.options(
                self.runtime_params
                    .iter()
                    .map(|(name, value)| (name, escape_option_value(value))),
            );
        }

        Ok(options)
    }

    fn set(&mut self, key: &str, value: String) -> std::result::Result<(), String> {
        match key {
            "host" => self.host = Some(value),
            "hostaddr" => self.hostaddr = Some(value),
            "port" => {
                let port = value
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port {:?}", value))?;
                self.port = Some(port);
            }
            "user" => self.user = Some(value),
            "password" => self.password = Some(value),
            "dbname" | "database" => self.dbname = Some(value),
            "sslmode" => {
                PgSslMode::from_str(&value).map_err(|_| format!("invalid sslmode {:?}", value))?;
                self.sslmode = Some(value);
            }
            "sslrootcert" => self.ssl_root_cert = Some(value),
            "sslcert" => self.ssl_client_cert = Some(value),
            "sslkey" => self.ssl_client_key = Some(value),
            "application_name" => self.application_name = Some(value),
            "fallback_application_name" => self.fallback_application_name = Some(value),
            "connect_timeout" => {
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid connect_timeout {:?}", value))?;
                self.connect_timeout = Some(Duration::from_secs(secs));
            }
            "options" => {
                for (name, value) in parse_server_options(&value)? {
                    self.runtime_params.insert(name, value);
                }
            }
            key if UNSUPPORTED_CLIENT_KEYS.contains(&key) => {
                tracing::warn!(key, "Ignoring unsupported connection setting");
            }
            _ => {
                self.runtime_params.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    fn from_url(s: &str) -> std::result::Result<Self, String> {
        let url = Url::parse(s).map_err(|e| format!("invalid connection URL: {}", e))?;
        let mut params = Self::default();

        if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            params.host = Some(decode(host)?);
        }
        params.port = url.port();
        if !url.username().is_empty() {
            params.user = Some(decode(url.username())?);
        }
        if let Some(password) = url.password() {
            params.password = Some(decode(password)?);
        }
        let path = url.path().trim_start_matches('/');
        if !path.is_empty() {
            params.dbname = Some(decode(path)?);
        }

        for (key, value) in url.query_pairs() {
            params.set(&key, value.into_owned())?;
        }

        Ok(params)
    }

    fn from_key_values(s: &str) -> std::result::Result<Self, String> {
        let mut params = Self::default();
        let mut chars = s.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
                key.push(c);
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.next() != Some('=') {
                return Err(format!("missing \"=\" after {:?}", key));
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            let mut value = String::new();
            if chars.next_if_eq(&'\'').is_some() {
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(c) => value.push(c),
                            None => return Err("unterminated escape".to_string()),
                        },
                        Some('\'') => break,
                        Some(c) => value.push(c),
                        None => return Err(format!("unterminated quoted value for {:?}", key)),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    } else {
                        value.push(c);
                    }
                }
            }

            params.set(&key, value)?;
        }

        Ok(params)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("hostaddr", &self.hostaddr)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("dbname", &self.dbname)
            .field("sslmode", &self.sslmode)
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("ssl_client_cert", &self.ssl_client_cert)
            .field("ssl_client_key", &self.ssl_client_key)
            .field("application_name", &self.application_name)
            .field("fallback_application_name", &self.fallback_application_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("runtime_params", &self.runtime_params)
            .finish()
    }
}

fn decode(s: &str) -> std::result::Result<String, String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| format!("invalid UTF-8 in {:?}", s))
}

/// Split the libpq `options` value into server settings.
///
/// Arguments are separated by whitespace, a backslash escapes the next
/// character. Only `-c name=value`, `-cname=value` and `--name=value`
/// are accepted.
fn parse_server_options(s: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    let mut settings = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let setting = if arg == "-c" {
            args.next()
                .ok_or_else(|| "\"-c\" without a setting in options".to_string())?
        } else if let Some(rest) = arg.strip_prefix("--") {
            rest.to_string()
        } else if let Some(rest) = arg.strip_prefix("-c") {
            rest.to_string()
        } else {
            return Err(format!("unsupported server option {:?}", arg));
        };

        let (name, value) = setting
            .split_once('=')
            .ok_or_else(|| format!("server option {:?} has no value", setting))?;
        settings.push((name.replace('-', "_"), value.to_string()));
    }
    Ok(settings)
}

fn escape_option_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn default_socket_dir(port: u16) -> Option<&'static str> {
    let socket = format!(".s.PGSQL.{}", port);
    DEFAULT_SOCKET_DIRS
        .iter()
        .copied()
        .find(|dir| Path::new(dir).join(&socket).exists())
}
