//! The fixed set of channels the control core talks over.

use crate::channel::Channel;
use crate::error::Result;
use crate::local::LocalBroker;
use crate::messages::{ActuatorCmd, AuthResponse, DatabaseMsg};
use crate::posix::PosixQueue;
use crate::queue::OpenMode;
use crate::wire::WireMessage;
use tracing::{info, warn};
use warden_core::config::{IpcBackend, IpcConfig};

/// Where channels are opened.
#[derive(Debug, Clone)]
pub enum Backend {
    Posix,
    Local(LocalBroker),
}

impl Backend {
    /// Backend named by `config`; the local variant gets a fresh broker.
    pub fn from_config(config: &IpcConfig) -> Self {
        match config.backend {
            IpcBackend::Posix => Self::Posix,
            IpcBackend::Local => Self::Local(LocalBroker::new()),
        }
    }

    fn open<M: WireMessage>(&self, name: &str, capacity: usize, mode: OpenMode) -> Result<Channel<M>> {
        match self {
            Self::Posix => Channel::posix(name, capacity, mode),
            Self::Local(broker) => Channel::local(broker, name, capacity, mode),
        }
    }

    fn unlink(&self, name: &str) -> Result<()> {
        match self {
            Self::Posix => PosixQueue::unlink(name),
            Self::Local(broker) => {
                broker.unlink(name);
                Ok(())
            }
        }
    }
}

/// Every channel of the control core.
///
/// | Field | Direction |
/// |---|---|
/// | `db` | workers → storage |
/// | `entry_auth`, `exit_auth`, `motion` | storage → one worker each |
/// | `vault_cmd`, `env_cmd` | storage → vault / environment worker |
/// | `actuator` | workers and alarm timer → executor |
#[derive(Debug, Clone)]
pub struct ChannelSet {
    pub db: Channel<DatabaseMsg>,
    pub entry_auth: Channel<AuthResponse>,
    pub exit_auth: Channel<AuthResponse>,
    pub motion: Channel<AuthResponse>,
    pub vault_cmd: Channel<AuthResponse>,
    pub env_cmd: Channel<AuthResponse>,
    pub actuator: Channel<ActuatorCmd>,
    owner: bool,
}

impl ChannelSet {
    /// Open every channel named in `config`.
    ///
    /// As owner, channels are created empty and unlinked on
    /// [`release`](Self::release); otherwise they must already exist. An
    /// owner that fails partway unlinks the channels it already created.
    pub fn open(config: &IpcConfig, backend: &Backend, owner: bool) -> Result<Self> {
        let mode = if owner { OpenMode::Owner } else { OpenMode::Attacher };
        let mut opened = Vec::new();
        match Self::open_all(config, backend, mode, &mut opened) {
            Ok(set) => {
                info!(owner, capacity = config.capacity, "IPC channels open");
                Ok(set)
            }
            Err(e) => {
                if owner {
                    for name in opened {
                        if let Err(err) = backend.unlink(name) {
                            warn!(channel = name, error = %err, "failed to unlink channel");
                        }
                    }
                }
                Err(e)
            }
        }
    }

    fn open_all<'a>(
        config: &'a IpcConfig,
        backend: &Backend,
        mode: OpenMode,
        opened: &mut Vec<&'a str>,
    ) -> Result<Self> {
        let names = &config.names;
        let capacity = config.capacity;
        Ok(Self {
            db: track(backend, &names.db, capacity, mode, opened)?,
            entry_auth: track(backend, &names.entry_auth, capacity, mode, opened)?,
            exit_auth: track(backend, &names.exit_auth, capacity, mode, opened)?,
            motion: track(backend, &names.motion, capacity, mode, opened)?,
            vault_cmd: track(backend, &names.vault_cmd, capacity, mode, opened)?,
            env_cmd: track(backend, &names.env_cmd, capacity, mode, opened)?,
            actuator: track(backend, &names.actuator, capacity, mode, opened)?,
            owner: mode == OpenMode::Owner,
        })
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Unlink every channel if this set owns them. Failures are logged and
    /// the remaining channels are still released.
    pub fn release(&self) {
        if !self.owner {
            return;
        }
        let results = [
            (self.db.name(), self.db.release()),
            (self.entry_auth.name(), self.entry_auth.release()),
            (self.exit_auth.name(), self.exit_auth.release()),
            (self.motion.name(), self.motion.release()),
            (self.vault_cmd.name(), self.vault_cmd.release()),
            (self.env_cmd.name(), self.env_cmd.release()),
            (self.actuator.name(), self.actuator.release()),
        ];
        for (name, result) in results {
            if let Err(e) = result {
                warn!(channel = name, error = %e, "failed to release channel");
            }
        }
        info!("IPC channels released");
    }
}

fn track<'a, M: WireMessage>(
    backend: &Backend,
    name: &'a str,
    capacity: usize,
    mode: OpenMode,
    opened: &mut Vec<&'a str>,
) -> Result<Channel<M>> {
    let channel = backend.open(name, capacity, mode)?;
    opened.push(name);
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IpcError;

    fn local_config() -> IpcConfig {
        IpcConfig {
            backend: IpcBackend::Local,
            ..IpcConfig::default()
        }
    }

    #[test]
    fn test_attacher_requires_owner() {
        let config = local_config();
        let backend = Backend::from_config(&config);
        assert!(matches!(
            ChannelSet::open(&config, &backend, false),
            Err(IpcError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_owner_open_unlinks_created_channels() {
        let mut config = local_config();
        config.names.env_cmd = "warden_env_cmd".to_string();
        let broker = LocalBroker::new();
        let err = ChannelSet::open(&config, &Backend::Local(broker.clone()), true).unwrap_err();
        assert!(matches!(err, IpcError::InvalidName(_)));
        for name in config.names.all() {
            assert!(!broker.contains(name), "{name} left behind");
        }
    }

    #[test]
    fn test_owner_release_unlinks_all() {
        let config = local_config();
        let broker = LocalBroker::new();
        let backend = Backend::Local(broker.clone());
        let owned = ChannelSet::open(&config, &backend, true).unwrap();
        let attached = ChannelSet::open(&config, &backend, false).unwrap();

        attached.release();
        for name in config.names.all() {
            assert!(broker.contains(name));
        }

        owned.release();
        for name in config.names.all() {
            assert!(!broker.contains(name));
        }
    }
}
