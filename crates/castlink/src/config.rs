//! Plugin settings.
//!
//! Settings are string values addressed by `(section, key)` and persisted as
//! a JSON document. [`PluginConfig`] layers typed accessors and the device
//! table on top of a [`SettingsStore`], and publishes a change notification
//! whenever a setting is written.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Section holding plugin-wide settings.
pub const DEFAULT_SECTION: &str = "settings";
/// Default port for the plugin's embedded web server.
pub const DEFAULT_WEB_SERVER_PORT: u16 = 8081;

const DEBUG_LOGGING_KEY: &str = "debug_logging";
const WEB_SERVER_PORT_KEY: &str = "web_server_port";
const WEB_SERVER_IP_KEY: &str = "web_server_ip";
const DEVICE_IDS_KEY: &str = "device_ids";
const NAME_KEY: &str = "name";
const IP_ADDRESS_KEY: &str = "ip_address";
const VOLUME_KEY: &str = "volume";
const DEVICE_IDS_SEPARATOR: char = '|';

/// Errors raised while loading or persisting settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the settings file failed.
    #[error("settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid JSON.
    #[error("settings file is malformed: {0}")]
    Json(#[from] serde_json::Error),

    /// A device id cannot be stored.
    #[error("invalid device id '{0}'")]
    InvalidDeviceId(String),

    /// No web server override is set and no local IPv4 address was found.
    #[error("no local IPv4 address found: {0}")]
    NoLocalAddress(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Section-scoped key/value settings, optionally backed by a file.
#[derive(Debug, Default)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    sections: Sections,
}

type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// Pending edits applied by [`SettingsStore::batch`].
#[derive(Debug)]
pub struct SettingsBatch<'a> {
    sections: &'a mut Sections,
    changed: bool,
}

impl SettingsBatch<'_> {
    /// Store `value` under `key` in `section`.
    pub fn set(&mut self, section: &str, key: &str, value: impl Display) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.changed = true;
    }

    /// Remove a whole section.
    pub fn clear_section(&mut self, section: &str) {
        self.changed |= self.sections.remove(section).is_some();
    }
}

impl SettingsStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load settings from `path`. A missing file yields an empty store that
    /// will be created on the first write.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sections = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        debug!(path = %path.display(), "loaded settings");
        Ok(Self {
            path: Some(path),
            sections,
        })
    }

    /// File backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw value of `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|values| values.get(key))
            .map(String::as_str)
    }

    /// Parsed value of `key` in `section`, or `default` when absent or unparseable.
    pub fn get_or<T: FromStr>(&self, section: &str, key: &str, default: T) -> T {
        self.get(section, key)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(default)
    }

    /// Store `value` under `key` in `section` and persist.
    pub fn set(&mut self, section: &str, key: &str, value: impl Display) -> Result<()> {
        self.batch(|batch| batch.set(section, key, value))
    }

    /// Remove a whole section and persist.
    pub fn clear_section(&mut self, section: &str) -> Result<()> {
        self.batch(|batch| batch.clear_section(section))
    }

    /// Apply a group of edits and persist them with a single write.
    ///
    /// Either every edit lands or, when the write fails, none does and the
    /// store keeps its previous contents.
    pub fn batch<F>(&mut self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut SettingsBatch<'_>),
    {
        let snapshot = self.sections.clone();
        let mut batch = SettingsBatch {
            sections: &mut self.sections,
            changed: false,
        };
        edit(&mut batch);
        if !batch.changed {
            return Ok(());
        }
        if let Err(err) = self.save() {
            self.sections = snapshot;
            return Err(err);
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_vec_pretty(&self.sections)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

/// A configured cast device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CastDevice {
    pub id: String,
    pub name: String,
    pub address: Option<IpAddr>,
    pub volume: Option<u16>,
}

impl CastDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: Option<IpAddr>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: u16) -> Self {
        self.volume = Some(volume);
        self
    }
}

#[derive(Debug)]
struct State {
    store: SettingsStore,
    debug_logging: bool,
    web_server_port: u16,
    web_server_ip: Option<IpAddr>,
    devices: BTreeMap<String, CastDevice>,
}

/// Typed plugin settings over a [`SettingsStore`].
///
/// Reads take a shared lock and return copies; writes persist before
/// updating the cached value, then notify [`PluginConfig::subscribe`]
/// receivers.
#[derive(Debug)]
pub struct PluginConfig {
    state: RwLock<State>,
    changes: watch::Sender<u64>,
}

impl PluginConfig {
    /// Build the typed view, filling in defaults for anything missing.
    pub fn load(mut store: SettingsStore) -> Result<Self> {
        let debug_logging = store.get_or(DEFAULT_SECTION, DEBUG_LOGGING_KEY, false);
        let web_server_port =
            store.get_or(DEFAULT_SECTION, WEB_SERVER_PORT_KEY, DEFAULT_WEB_SERVER_PORT);
        let web_server_ip = store
            .get(DEFAULT_SECTION, WEB_SERVER_IP_KEY)
            .and_then(|raw| raw.parse().ok());

        let mut devices = BTreeMap::new();
        let ids = store
            .get(DEFAULT_SECTION, DEVICE_IDS_KEY)
            .unwrap_or_default()
            .to_string();
        for id in ids.split(DEVICE_IDS_SEPARATOR).map(str::trim) {
            if id.is_empty() {
                continue;
            }
            let name = store.get(id, NAME_KEY).unwrap_or_default().to_string();
            let address = store.get(id, IP_ADDRESS_KEY).and_then(|raw| raw.parse().ok());
            let volume: i32 = store.get_or(id, VOLUME_KEY, -1);
            devices.insert(
                id.to_string(),
                CastDevice {
                    id: id.to_string(),
                    name,
                    address,
                    volume: u16::try_from(volume).ok(),
                },
            );
        }

        // Materialize the port so a fresh settings file lists it.
        store.set(DEFAULT_SECTION, WEB_SERVER_PORT_KEY, web_server_port)?;

        Ok(Self {
            state: RwLock::new(State {
                store,
                debug_logging,
                web_server_port,
                web_server_ip,
                devices,
            }),
            changes: watch::channel(0).0,
        })
    }

    /// Observe setting changes. The value counts notifications so far.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Notify subscribers that settings changed.
    ///
    /// Setters call this themselves; call it directly after changing
    /// something subscribers derive from settings.
    pub fn fire_config_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    pub fn debug_logging(&self) -> bool {
        self.read().debug_logging
    }

    pub fn set_debug_logging(&self, enabled: bool) -> Result<()> {
        let mut state = self.write();
        state.store.set(DEFAULT_SECTION, DEBUG_LOGGING_KEY, enabled)?;
        state.debug_logging = enabled;
        drop(state);
        self.fire_config_changed();
        Ok(())
    }

    pub fn web_server_port(&self) -> u16 {
        self.read().web_server_port
    }

    pub fn set_web_server_port(&self, port: u16) -> Result<()> {
        let mut state = self.write();
        state.store.set(DEFAULT_SECTION, WEB_SERVER_PORT_KEY, port)?;
        state.web_server_port = port;
        drop(state);
        self.fire_config_changed();
        Ok(())
    }

    /// Address the embedded web server should advertise, when overridden.
    pub fn web_server_ip(&self) -> Option<IpAddr> {
        self.read().web_server_ip
    }

    pub fn set_web_server_ip(&self, address: Option<IpAddr>) -> Result<()> {
        let mut state = self.write();
        let raw = address.map(|ip| ip.to_string()).unwrap_or_default();
        state.store.set(DEFAULT_SECTION, WEB_SERVER_IP_KEY, raw)?;
        state.web_server_ip = address;
        drop(state);
        self.fire_config_changed();
        Ok(())
    }

    /// Address the embedded web server is reachable on.
    ///
    /// The configured override wins unless it is the unspecified address;
    /// otherwise this is the local IPv4 address of the default route.
    pub fn server_ip_address(&self) -> Result<IpAddr> {
        resolve_server_address(self.web_server_ip(), local_ipv4)
    }

    /// Snapshot of the device table.
    pub fn devices(&self) -> BTreeMap<String, CastDevice> {
        self.read().devices.clone()
    }

    pub fn device(&self, id: &str) -> Option<CastDevice> {
        self.read().devices.get(id).cloned()
    }

    /// Insert or replace a device.
    pub fn add_device(&self, device: CastDevice) -> Result<()> {
        if device.id.trim().is_empty()
            || device.id.contains(DEVICE_IDS_SEPARATOR)
            || device.id == DEFAULT_SECTION
        {
            return Err(ConfigError::InvalidDeviceId(device.id));
        }

        let mut state = self.write();
        let ids = join_ids(
            state
                .devices
                .keys()
                .map(String::as_str)
                .chain(std::iter::once(device.id.as_str())),
        );
        let address = device.address.map(|ip| ip.to_string()).unwrap_or_default();
        let volume = device.volume.map_or(-1, i32::from);
        state.store.batch(|batch| {
            batch.set(&device.id, NAME_KEY, &device.name);
            batch.set(&device.id, IP_ADDRESS_KEY, address);
            batch.set(&device.id, VOLUME_KEY, volume);
            batch.set(DEFAULT_SECTION, DEVICE_IDS_KEY, ids);
        })?;
        debug!(id = %device.id, "device stored");
        state.devices.insert(device.id.clone(), device);
        drop(state);
        self.fire_config_changed();
        Ok(())
    }

    /// Remove a device and its settings section. Returns false if unknown.
    pub fn remove_device(&self, id: &str) -> Result<bool> {
        let mut state = self.write();
        if !state.devices.contains_key(id) {
            return Ok(false);
        }
        let ids = join_ids(
            state
                .devices
                .keys()
                .map(String::as_str)
                .filter(|known| *known != id),
        );
        state.store.batch(|batch| {
            batch.set(DEFAULT_SECTION, DEVICE_IDS_KEY, ids);
            batch.clear_section(id);
        })?;
        state.devices.remove(id);
        drop(state);
        self.fire_config_changed();
        Ok(true)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let ids: std::collections::BTreeSet<&str> = ids.collect();
    ids.into_iter()
        .collect::<Vec<_>>()
        .join(&DEVICE_IDS_SEPARATOR.to_string())
}

fn resolve_server_address<F>(configured: Option<IpAddr>, local: F) -> Result<IpAddr>
where
    F: FnOnce() -> io::Result<Ipv4Addr>,
{
    if let Some(address) = configured.filter(|ip| !ip.is_unspecified()) {
        return Ok(address);
    }
    match local() {
        Ok(address) => Ok(IpAddr::V4(address)),
        Err(err) => {
            warn!(error = %err, "no local IPv4 address for the web server");
            Err(ConfigError::NoLocalAddress(err))
        }
    }
}

/// IPv4 address of the interface holding the default route.
fn local_ipv4() -> io::Result<Ipv4Addr> {
    // Connecting a UDP socket only selects a route; nothing is sent.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(address) if !address.is_unspecified() && !address.is_loopback() => Ok(address),
        other => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("default route uses {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn temp_settings(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "castlink-config-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        dir.join("settings.json")
    }

    #[test]
    fn defaults_for_empty_store() {
        let config = PluginConfig::load(SettingsStore::in_memory()).unwrap();
        assert!(!config.debug_logging());
        assert_eq!(config.web_server_port(), DEFAULT_WEB_SERVER_PORT);
        assert_eq!(config.web_server_ip(), None);
        assert!(config.devices().is_empty());
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let mut store = SettingsStore::in_memory();
        store.set(DEFAULT_SECTION, WEB_SERVER_PORT_KEY, "not-a-port").unwrap();
        store.set(DEFAULT_SECTION, DEBUG_LOGGING_KEY, "maybe").unwrap();

        let config = PluginConfig::load(store).unwrap();
        assert_eq!(config.web_server_port(), DEFAULT_WEB_SERVER_PORT);
        assert!(!config.debug_logging());
    }

    #[test]
    fn devices_persist_across_reload() {
        let path = temp_settings("devices");
        {
            let config = PluginConfig::load(SettingsStore::load(&path).unwrap()).unwrap();
            config
                .add_device(
                    CastDevice::new("kitchen", "Kitchen speaker", Some(Ipv4Addr::new(10, 0, 0, 7).into()))
                        .with_volume(40),
                )
                .unwrap();
            config
                .add_device(CastDevice::new("den", "Den TV", None))
                .unwrap();
            config.set_debug_logging(true).unwrap();
        }

        let config = PluginConfig::load(SettingsStore::load(&path).unwrap()).unwrap();
        assert!(config.debug_logging());
        let kitchen = config.device("kitchen").unwrap();
        assert_eq!(kitchen.name, "Kitchen speaker");
        assert_eq!(kitchen.address, Some(Ipv4Addr::new(10, 0, 0, 7).into()));
        assert_eq!(kitchen.volume, Some(40));
        let den = config.device("den").unwrap();
        assert_eq!(den.address, None);
        assert_eq!(den.volume, None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn remove_device_clears_its_section() {
        let config = PluginConfig::load(SettingsStore::in_memory()).unwrap();
        config
            .add_device(CastDevice::new("a", "A", None))
            .unwrap();
        config
            .add_device(CastDevice::new("b", "B", None))
            .unwrap();

        assert!(config.remove_device("a").unwrap());
        assert!(!config.remove_device("a").unwrap());

        let state = config.read();
        assert_eq!(state.store.get(DEFAULT_SECTION, DEVICE_IDS_KEY), Some("b"));
        assert_eq!(state.store.get("a", NAME_KEY), None);
    }

    #[test]
    fn rejects_ids_that_break_the_id_list() {
        let config = PluginConfig::load(SettingsStore::in_memory()).unwrap();
        for bad in ["", "a|b", DEFAULT_SECTION] {
            let err = config
                .add_device(CastDevice::new(bad, "x", None))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidDeviceId(_)));
        }
    }

    #[test]
    fn fresh_file_gets_web_server_port() {
        let path = temp_settings("fresh");
        let _config = PluginConfig::load(SettingsStore::load(&path).unwrap()).unwrap();

        let store = SettingsStore::load(&path).unwrap();
        assert_eq!(store.get(DEFAULT_SECTION, WEB_SERVER_PORT_KEY), Some("8081"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = temp_settings("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        let err = SettingsStore::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn web_server_ip_roundtrips_through_store() {
        let config = PluginConfig::load(SettingsStore::in_memory()).unwrap();
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 20).into();
        config.set_web_server_ip(Some(ip)).unwrap();
        config.set_web_server_port(9000).unwrap();
        assert_eq!(config.web_server_ip(), Some(ip));
        assert_eq!(config.web_server_port(), 9000);

        config.set_web_server_ip(None).unwrap();
        assert_eq!(config.web_server_ip(), None);
    }

    #[test]
    fn failed_save_leaves_device_table_untouched() {
        let path = temp_settings("failed-save");
        let dir = path.parent().unwrap().to_path_buf();
        let config = PluginConfig::load(SettingsStore::load(&path).unwrap()).unwrap();
        config.add_device(CastDevice::new("keep", "Keep", None)).unwrap();
        let changes = config.subscribe();

        // A plain file where the settings directory was makes every save fail.
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, b"").unwrap();

        let err = config
            .add_device(CastDevice::new("x", "X", Some(Ipv4Addr::new(10, 0, 0, 9).into())))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(config.device("x").is_none());
        {
            let state = config.read();
            assert_eq!(state.store.get("x", NAME_KEY), None);
            assert_eq!(state.store.get(DEFAULT_SECTION, DEVICE_IDS_KEY), Some("keep"));
        }

        assert!(config.remove_device("keep").is_err());
        assert!(config.device("keep").is_some());
        assert_eq!(config.read().store.get("keep", NAME_KEY), Some("Keep"));
        assert!(!changes.has_changed().unwrap());

        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn batch_persists_all_edits_at_once() {
        let path = temp_settings("batch");
        let mut store = SettingsStore::load(&path).unwrap();
        store
            .batch(|batch| {
                batch.set("a", "one", 1);
                batch.set("b", "two", 2);
                batch.clear_section("missing");
            })
            .unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.get("a", "one"), Some("1"));
        assert_eq!(reloaded.get("b", "two"), Some("2"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn writes_notify_subscribers() {
        let config = PluginConfig::load(SettingsStore::in_memory()).unwrap();
        let mut changes = config.subscribe();
        assert!(!changes.has_changed().unwrap());

        config.set_debug_logging(true).unwrap();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);

        config.add_device(CastDevice::new("a", "A", None)).unwrap();
        assert_eq!(*changes.borrow_and_update(), 2);

        // Nothing to remove, nothing to announce.
        assert!(!config.remove_device("missing").unwrap());
        assert!(!changes.has_changed().unwrap());

        config.fire_config_changed();
        assert!(changes.has_changed().unwrap());
    }

    #[test]
    fn configured_server_address_wins() {
        let config = PluginConfig::load(SettingsStore::in_memory()).unwrap();
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 20).into();
        config.set_web_server_ip(Some(ip)).unwrap();
        assert_eq!(config.server_ip_address().unwrap(), ip);
    }

    #[test]
    fn unspecified_server_address_uses_local_interface() {
        let local = Ipv4Addr::new(10, 1, 2, 3);
        let resolved = resolve_server_address(Some(Ipv4Addr::UNSPECIFIED.into()), || Ok(local));
        assert_eq!(resolved.unwrap(), IpAddr::V4(local));

        let resolved = resolve_server_address(None, || Ok(local));
        assert_eq!(resolved.unwrap(), IpAddr::V4(local));
    }

    #[test]
    fn missing_local_address_is_reported() {
        let err = resolve_server_address(None, || {
            Err(io::Error::from(io::ErrorKind::NotFound))
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::NoLocalAddress(_)));
    }

    #[test]
    fn server_address_is_never_unspecified() {
        let config = PluginConfig::load(SettingsStore::in_memory()).unwrap();
        config.set_web_server_ip(Some(Ipv4Addr::UNSPECIFIED.into())).unwrap();
        match config.server_ip_address() {
            Ok(ip) => assert!(!ip.is_unspecified() && !ip.is_loopback()),
            Err(err) => assert!(matches!(err, ConfigError::NoLocalAddress(_))),
        }
    }
}
