//! Privilege level tracking and navigation.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::graph::{Hop, PrivilegeAction, PrivilegeGraph};
use crate::channel::Channel;
use crate::error::{ChannelError, DriverError, Result};
use crate::platform::PrivilegeLevel;
use crate::transport::Transport;

/// Tracks the current privilege level and moves between levels.
///
/// The current level starts unknown and is only ever set from a prompt that
/// matched a level's pattern. Navigation follows the [`PrivilegeGraph`] one
/// hop at a time, verifying the prompt after every hop.
#[derive(Debug)]
pub struct PrivilegeManager {
    /// The privilege tree.
    graph: PrivilegeGraph,

    /// Current privilege level name (None while unknown).
    current: Option<String>,

    /// How many times a hop is repeated when its prompt does not confirm it.
    hop_retries: usize,

    /// Per auth-requiring level: "auth prompt or any prompt".
    auth_or_prompt: HashMap<String, Regex>,
}

impl PrivilegeManager {
    /// Create a privilege manager over a validated graph.
    ///
    /// `prompt_pattern` is the joined prompt pattern of the session; it is
    /// combined with each level's auth prompt so an escalation that does not
    /// ask for a password is still recognized.
    pub fn new(graph: PrivilegeGraph, prompt_pattern: &Regex, hop_retries: usize) -> Result<Self> {
        let mut auth_or_prompt = HashMap::new();
        for level in graph.levels() {
            if let Some(auth) = level.auth_prompt() {
                let combined = format!("(?:{})|(?:{})", auth.as_str(), prompt_pattern.as_str());
                let combined = Regex::new(&combined).map_err(ChannelError::InvalidPattern)?;
                auth_or_prompt.insert(level.name.clone(), combined);
            }
        }

        Ok(Self {
            graph,
            current: None,
            hop_retries,
            auth_or_prompt,
        })
    }

    /// Get the privilege graph.
    pub fn graph(&self) -> &PrivilegeGraph {
        &self.graph
    }

    /// Set how many times an unconfirmed hop is repeated.
    pub fn set_hop_retries(&mut self, retries: usize) {
        self.hop_retries = retries;
    }

    /// Get a privilege level by name.
    pub fn get(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.graph.get(name)
    }

    /// Get the current privilege level.
    pub fn current(&self) -> Option<&PrivilegeLevel> {
        self.current.as_deref().and_then(|name| self.graph.get(name))
    }

    /// Get the current privilege level name.
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Forget the current privilege level.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Record the level a prompt belongs to; unknown for unrecognized prompts.
    pub fn observe_prompt(&mut self, prompt: &str) -> Option<&str> {
        self.current = self
            .determine_from_prompt(prompt)
            .ok()
            .map(|level| level.name.clone());
        self.current.as_deref()
    }

    /// Determine the privilege level a prompt belongs to.
    ///
    /// Levels are tried in configuration order; the first whose pattern
    /// matches and whose `not_contains` strings are absent wins. Further
    /// matches are reported as a configuration smell.
    pub fn determine_from_prompt(&self, prompt: &str) -> Result<&PrivilegeLevel> {
        let mut matching = self.graph.levels().filter(|level| level.matches(prompt));

        let Some(level) = matching.next() else {
            return Err(DriverError::CouldNotDeterminePrivilege {
                prompt: prompt.to_string(),
            }
            .into());
        };

        let shadowed: Vec<&str> = matching.map(|l| l.name.as_str()).collect();
        if !shadowed.is_empty() {
            warn!(
                "privilege: prompt {:?} matches '{}' and also {:?}; using '{}'",
                prompt, level.name, shadowed, level.name
            );
        }

        Ok(level)
    }

    /// Ask the device for its prompt and record the matching level.
    pub async fn determine_current<T: Transport>(
        &mut self,
        channel: &mut Channel<T>,
        timeout: Duration,
    ) -> Result<String> {
        let prompt = channel.get_prompt(timeout).await?;
        match self.observe_prompt(&prompt) {
            Some(name) => {
                debug!("privilege: current level '{}' from prompt {:?}", name, prompt);
                Ok(name.to_string())
            }
            None => Err(DriverError::CouldNotDeterminePrivilege { prompt }.into()),
        }
    }

    /// Move the device to the `desired` privilege level.
    ///
    /// Returns immediately, without I/O, if the current level is already
    /// known to be `desired`. Otherwise the current level is read from the
    /// device prompt and the graph path is executed hop by hop. Any I/O
    /// failure aborts the whole operation and leaves the current level at
    /// the last confirmed value.
    pub async fn acquire<T: Transport>(
        &mut self,
        channel: &mut Channel<T>,
        desired: &str,
        auth_secondary: Option<&SecretString>,
        timeout: Duration,
    ) -> Result<()> {
        if self.graph.get(desired).is_none() {
            return Err(DriverError::InvalidDesiredPrivilege {
                name: desired.to_string(),
            }
            .into());
        }

        if self.current.as_deref() == Some(desired) {
            debug!("privilege: already at '{}'", desired);
            return Ok(());
        }

        let current = self.determine_current(channel, timeout).await?;
        let path = self.graph.path_to(&current, desired)?;
        if path.action == PrivilegeAction::NoAction {
            return Ok(());
        }

        debug!(
            "privilege: '{}' -> '{}' in {} hop(s)",
            current,
            desired,
            path.hops.len()
        );

        for hop in &path.hops {
            self.execute_hop(channel, hop, auth_secondary, timeout).await?;
        }

        Ok(())
    }

    /// Run one hop, repeating it while the device stays where it was.
    async fn execute_hop<T: Transport>(
        &mut self,
        channel: &mut Channel<T>,
        hop: &Hop,
        auth_secondary: Option<&SecretString>,
        timeout: Duration,
    ) -> Result<()> {
        let from = self.current.clone().unwrap_or_default();
        let mut attempt = 0;

        loop {
            let prompt = self
                .transition(channel, &from, hop, auth_secondary, timeout)
                .await?;

            let confirmed = self
                .graph
                .get(&hop.level)
                .is_some_and(|target| target.matches(&prompt));
            if confirmed {
                debug!("privilege: now at '{}'", hop.level);
                self.current = Some(hop.level.clone());
                return Ok(());
            }

            let observed = self.observe_prompt(&prompt).map(str::to_string);
            if attempt >= self.hop_retries || observed.as_deref() != Some(from.as_str()) {
                return Err(DriverError::CouldNotDeterminePrivilege { prompt }.into());
            }

            attempt += 1;
            warn!(
                "privilege: {:?} to '{}' not confirmed by prompt {:?}, retrying ({}/{})",
                hop.action, hop.level, prompt, attempt, self.hop_retries
            );
        }
    }

    /// Send the commands for one hop and return the prompt that follows.
    async fn transition<T: Transport>(
        &self,
        channel: &mut Channel<T>,
        from: &str,
        hop: &Hop,
        auth_secondary: Option<&SecretString>,
        timeout: Duration,
    ) -> Result<String> {
        let (command, auth) = match hop.action {
            PrivilegeAction::Escalate => {
                let target = self.level(&hop.level)?;
                (
                    target.escalate_command.clone().unwrap_or_default(),
                    self.auth_or_prompt.get(&hop.level).zip(target.auth_prompt()),
                )
            }
            PrivilegeAction::Deescalate => {
                let leaving = self.level(from)?;
                (leaving.deescalate_command.clone().unwrap_or_default(), None)
            }
            PrivilegeAction::NoAction => return Ok(channel.get_prompt(timeout).await?),
        };

        channel.send_input(&command, false, timeout).await?;

        let data = match auth {
            Some((auth_or_prompt, auth_prompt)) => {
                let data = channel.read_until_pattern(auth_or_prompt, timeout).await?;
                // only the match that ended the read decides, not earlier output
                let asked = channel
                    .last_match(auth_or_prompt, &data)
                    .is_some_and(|hit| auth_prompt.find_at(&data, hit.start).is_some_and(|m| m.end() <= hit.end));
                if asked {
                    let secret = match auth_secondary {
                        Some(secret) => secret.expose_secret(),
                        None => {
                            warn!(
                                "privilege: '{}' asks for a password but no secondary credential is set",
                                hop.level
                            );
                            ""
                        }
                    };
                    channel.send_input(secret, true, timeout).await?;
                    channel.read_until_prompt(timeout).await?
                } else {
                    data
                }
            }
            None => channel.read_until_prompt(timeout).await?,
        };

        Ok(channel.extract_prompt(&data))
    }

    fn level(&self, name: &str) -> Result<&PrivilegeLevel> {
        self.graph.get(name).ok_or_else(|| {
            DriverError::CouldNotDeterminePrivilege {
                prompt: name.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelConfig, joined_prompt_pattern};
    use crate::testing::{FakeDevice, SECONDARY, lab_platform};

    fn setup(device: FakeDevice) -> (PrivilegeManager, Channel<FakeDevice>) {
        let platform = lab_platform();
        let prompt = joined_prompt_pattern(platform.privilege_levels.values()).unwrap();
        let graph = PrivilegeGraph::build(platform.privilege_levels).unwrap();
        let manager = PrivilegeManager::new(graph, &prompt, 1).unwrap();

        let mut device = device;
        device.open_now();
        (manager, Channel::new(device, ChannelConfig::default(), prompt))
    }

    fn secret() -> SecretString {
        SecretString::from(SECONDARY.to_string())
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_determine_privilege() {
        let (manager, _) = setup(FakeDevice::new(lab_platform(), "exec"));

        assert_eq!(manager.determine_from_prompt("router>").unwrap().name, "exec");
        assert_eq!(
            manager.determine_from_prompt("router#").unwrap().name,
            "privilege_exec"
        );
        assert_eq!(
            manager.determine_from_prompt("router(config)#").unwrap().name,
            "configuration"
        );
        assert!(manager.determine_from_prompt("Password:").is_err());
    }

    #[test]
    fn test_first_matching_level_wins() {
        let broad = PrivilegeLevel::new("broad", r"#$").unwrap();
        let narrow = PrivilegeLevel::new("narrow", r"router#$")
            .unwrap()
            .with_parent("broad")
            .with_escalate("narrow")
            .with_deescalate("exit");
        let levels = [broad, narrow]
            .into_iter()
            .map(|l| (l.name.clone(), l))
            .collect();
        let graph = PrivilegeGraph::build(levels).unwrap();
        let prompt = Regex::new("#$").unwrap();
        let manager = PrivilegeManager::new(graph, &prompt, 1).unwrap();

        assert_eq!(manager.determine_from_prompt("router#").unwrap().name, "broad");
    }

    #[tokio::test]
    async fn test_escalate_with_auth() {
        let (mut manager, mut channel) = setup(FakeDevice::new(lab_platform(), "exec"));

        manager
            .acquire(&mut channel, "privilege_exec", Some(&secret()), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(manager.current_name(), Some("privilege_exec"));
        assert_eq!(channel.transport().current(), "privilege_exec");
        assert_eq!(
            channel.transport().writes(),
            vec!["\n", "enable\n", "enablepass\n"]
        );
    }

    #[tokio::test]
    async fn test_password_text_in_earlier_output_sends_no_secret() {
        let platform = lab_platform();
        let prompt = joined_prompt_pattern(platform.privilege_levels.values()).unwrap();
        let graph = PrivilegeGraph::build(platform.privilege_levels).unwrap();
        let mut manager = PrivilegeManager::new(graph, &prompt, 1).unwrap();

        // this unit lets enable through without asking
        let passwordless = PrivilegeLevel::new("privilege_exec", r"(?m)^router#\s*$")
            .unwrap()
            .with_parent("exec")
            .with_escalate("enable")
            .with_deescalate("disable");
        let mut device = FakeDevice::new(lab_platform().with_privilege(passwordless), "exec").with_chunk_size(4096);
        device.notice("enable", "\nPassword:\n% password recovery is disabled on this unit\n");
        device.open_now();
        let config = ChannelConfig {
            search_depth: 20,
            ..ChannelConfig::default()
        };
        let mut channel = Channel::new(device, config, prompt);

        manager
            .acquire(&mut channel, "privilege_exec", Some(&secret()), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(manager.current_name(), Some("privilege_exec"));
        assert_eq!(channel.transport().writes(), vec!["\n", "enable\n"]);
    }

    #[tokio::test]
    async fn test_multi_hop_both_directions() {
        let (mut manager, mut channel) = setup(FakeDevice::new(lab_platform(), "exec"));

        manager
            .acquire(&mut channel, "configuration", Some(&secret()), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(channel.transport().current(), "configuration");

        manager
            .acquire(&mut channel, "exec", Some(&secret()), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(manager.current_name(), Some("exec"));
        assert_eq!(
            channel.transport().writes(),
            vec![
                "\n",
                "enable\n",
                "enablepass\n",
                "configure terminal\n",
                "\n",
                "end\n",
                "disable\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent() {
        let (mut manager, mut channel) = setup(FakeDevice::new(lab_platform(), "privilege_exec"));

        manager
            .acquire(&mut channel, "privilege_exec", None, TIMEOUT)
            .await
            .unwrap();
        let writes = channel.transport().writes().len();

        manager
            .acquire(&mut channel, "privilege_exec", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(channel.transport().writes().len(), writes);
    }

    #[tokio::test]
    async fn test_invalid_desired_issues_no_io() {
        let (mut manager, mut channel) = setup(FakeDevice::new(lab_platform(), "exec"));

        let err = manager
            .acquire(&mut channel, "vlan", None, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::InvalidDesiredPrivilege { .. })
        ));
        assert!(channel.transport().writes().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_auth_retried_once() {
        let device = FakeDevice::new(lab_platform(), "exec").reject_auth(1);
        let (mut manager, mut channel) = setup(device);

        manager
            .acquire(&mut channel, "privilege_exec", Some(&secret()), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(manager.current_name(), Some("privilege_exec"));
        assert_eq!(
            channel.transport().writes(),
            vec!["\n", "enable\n", "enablepass\n", "enable\n", "enablepass\n"]
        );
    }

    #[tokio::test]
    async fn test_rejected_auth_fails_after_retry() {
        let device = FakeDevice::new(lab_platform(), "exec").reject_auth(2);
        let (mut manager, mut channel) = setup(device);

        let err = manager
            .acquire(&mut channel, "privilege_exec", Some(&secret()), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::CouldNotDeterminePrivilege { ref prompt }) if prompt == "router>"
        ));
        // last confirmed level is what the device showed
        assert_eq!(manager.current_name(), Some("exec"));
    }

    #[tokio::test]
    async fn test_unrecognized_prompt() {
        let (mut manager, mut channel) = setup(FakeDevice::new(lab_platform(), "exec"));
        // a prompt that satisfies the joined pattern but is excluded everywhere
        manager.graph = {
            let mut platform = lab_platform();
            if let Some(exec) = platform.privilege_levels.get_mut("exec") {
                exec.not_contains.push("router".to_string());
            }
            PrivilegeGraph::build(platform.privilege_levels).unwrap()
        };

        let err = manager
            .acquire(&mut channel, "privilege_exec", None, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::CouldNotDeterminePrivilege { .. })
        ));
        assert_eq!(manager.current_name(), None);
    }

    #[tokio::test]
    async fn test_timeout_keeps_last_confirmed_level() {
        let (mut manager, mut channel) = setup(FakeDevice::new(lab_platform(), "exec"));
        manager
            .determine_current(&mut channel, TIMEOUT)
            .await
            .unwrap();
        channel.transport_mut().silent = true;

        let err = manager
            .acquire(&mut channel, "privilege_exec", Some(&secret()), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(manager.current_name(), Some("exec"));
    }
}
