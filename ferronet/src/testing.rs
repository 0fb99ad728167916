//! In-memory device double for unit tests.

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, TransportError};
use crate::platform::{PlatformDefinition, PrivilegeLevel};
use crate::transport::Transport;

pub(crate) const SECONDARY: &str = "enablepass";

/// Three-level IOS-like platform: exec > privilege_exec > configuration.
pub(crate) fn lab_platform() -> PlatformDefinition {
    let exec = PrivilegeLevel::new("exec", r"(?m)^router>\s*$").unwrap();

    let privilege_exec = PrivilegeLevel::new("privilege_exec", r"(?m)^router#\s*$")
        .unwrap()
        .with_parent("exec")
        .with_escalate("enable")
        .with_deescalate("disable")
        .with_auth(r"(?m)^Password:\s*$")
        .unwrap()
        .with_not_contains("(config");

    let configuration = PrivilegeLevel::new("configuration", r"(?m)^router\(config[\w-]*\)#\s*$")
        .unwrap()
        .with_parent("privilege_exec")
        .with_escalate("configure terminal")
        .with_deescalate("end");

    PlatformDefinition::new("lab")
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_default_privilege("privilege_exec")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Ambiguous command")
        .with_on_open_command("terminal length 0")
}

/// A device that never sends anything.
pub(crate) fn quiet_transport() -> FakeDevice {
    let mut device = FakeDevice::new(lab_platform(), "exec");
    device.silent = true;
    device.open_now();
    device
}

struct Transition {
    from: String,
    command: String,
    to: String,
    auth: bool,
}

/// Scripted shell that echoes input and tracks a privilege level.
pub(crate) struct FakeDevice {
    prompts: HashMap<String, String>,
    transitions: Vec<Transition>,
    responses: HashMap<String, (String, bool)>,
    notices: HashMap<String, String>,
    banner: String,
    current: String,
    awaiting_auth: Option<String>,
    secondary: String,
    auth_rejections: usize,
    pending: VecDeque<u8>,
    chunk_size: usize,
    echo: bool,
    pub(crate) silent: bool,
    writes: Vec<String>,
    open: bool,
    pub(crate) open_calls: usize,
    pub(crate) close_calls: usize,
}

impl FakeDevice {
    pub(crate) fn new(platform: PlatformDefinition, start: &str) -> Self {
        let mut prompts = HashMap::new();
        let mut transitions = Vec::new();
        for level in platform.privilege_levels.values() {
            let prompt = match level.name.as_str() {
                "exec" => "router>".to_string(),
                "privilege_exec" => "router#".to_string(),
                "configuration" => "router(config)#".to_string(),
                other => format!("{other}>"),
            };
            prompts.insert(level.name.clone(), prompt);

            if let Some(parent) = &level.previous_priv {
                if let Some(command) = &level.escalate_command {
                    transitions.push(Transition {
                        from: parent.clone(),
                        command: command.clone(),
                        to: level.name.clone(),
                        auth: level.escalate_auth,
                    });
                }
                if let Some(command) = &level.deescalate_command {
                    transitions.push(Transition {
                        from: level.name.clone(),
                        command: command.clone(),
                        to: parent.clone(),
                        auth: false,
                    });
                }
            }
        }

        Self {
            prompts,
            transitions,
            responses: HashMap::new(),
            notices: HashMap::new(),
            banner: String::new(),
            current: start.to_string(),
            awaiting_auth: None,
            secondary: SECONDARY.to_string(),
            auth_rejections: 0,
            pending: VecDeque::new(),
            chunk_size: 8,
            echo: true,
            silent: false,
            writes: Vec::new(),
            open: false,
            open_calls: 0,
            close_calls: 0,
        }
    }

    /// Shown ahead of the first prompt on every `open`.
    pub(crate) fn with_banner(mut self, banner: &str) -> Self {
        self.banner = banner.to_string();
        self
    }

    /// Largest chunk a single `read` returns (default 8).
    pub(crate) fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Emit `text` right after the echo of `command`, before its answer.
    pub(crate) fn notice(&mut self, command: &str, text: &str) {
        self.notices.insert(command.to_string(), text.to_string());
    }

    pub(crate) fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Reject the next `n` secondary passwords.
    pub(crate) fn reject_auth(mut self, n: usize) -> Self {
        self.auth_rejections = n;
        self
    }

    /// Answer `command` with `output` followed by the current prompt.
    pub(crate) fn respond(&mut self, command: &str, output: &str) {
        self.responses
            .insert(command.to_string(), (output.to_string(), true));
    }

    /// Answer `command` with `output` and no prompt (a follow-up question).
    pub(crate) fn ask(&mut self, command: &str, output: &str) {
        self.responses
            .insert(command.to_string(), (output.to_string(), false));
    }

    pub(crate) fn push_output(&mut self, output: &str) {
        self.pending.extend(output.as_bytes());
    }

    pub(crate) fn open_now(&mut self) {
        self.open = true;
    }

    pub(crate) fn writes(&self) -> Vec<&str> {
        self.writes.iter().map(String::as_str).collect()
    }

    pub(crate) fn current(&self) -> &str {
        &self.current
    }

    fn prompt(&self) -> String {
        self.prompts.get(&self.current).cloned().unwrap_or_default()
    }

    fn handle_line(&mut self, line: &str) {
        if let Some(target) = self.awaiting_auth.take() {
            if line == self.secondary && self.auth_rejections == 0 {
                self.current = target;
                let out = format!("\n{}", self.prompt());
                self.push_output(&out);
            } else {
                self.auth_rejections = self.auth_rejections.saturating_sub(1);
                let out = format!("\n% Access denied\n\n{}", self.prompt());
                self.push_output(&out);
            }
            return;
        }

        if self.echo {
            self.push_output(line);
        }
        if let Some(text) = self.notices.get(line).cloned() {
            self.push_output(&text);
        }

        if line.is_empty() {
            let out = format!("\n{}", self.prompt());
            self.push_output(&out);
            return;
        }

        let transition = self
            .transitions
            .iter()
            .find(|t| t.from == self.current && t.command == line)
            .map(|t| (t.to.clone(), t.auth));
        if let Some((to, auth)) = transition {
            if auth {
                self.awaiting_auth = Some(to);
                self.push_output("\nPassword: ");
            } else {
                self.current = to;
                let out = format!("\n{}", self.prompt());
                self.push_output(&out);
            }
            return;
        }

        let out = match self.responses.get(line) {
            Some((output, true)) => format!("\n{}{}", output, self.prompt()),
            Some((output, false)) => format!("\n{output}"),
            None => format!("\n% Invalid input detected at '^' marker.\n\n{}", self.prompt()),
        };
        self.push_output(&out);
    }
}

impl Transport for FakeDevice {
    async fn open(&mut self) -> Result<()> {
        self.open_calls += 1;
        self.open = true;
        let login = format!("{}{}", self.banner, self.prompt());
        self.push_output(&login);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.close_calls += 1;
        self.open = false;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::NotOpen.into());
        }
        let text = String::from_utf8_lossy(data).to_string();
        self.writes.push(text.clone());
        if self.silent {
            return Ok(());
        }

        let mut rest = text.as_str();
        while let Some(pos) = rest.find('\n') {
            self.handle_line(&rest[..pos]);
            rest = &rest[pos + 1..];
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        if !self.open {
            return Err(TransportError::NotOpen.into());
        }
        let n = self.pending.len().min(self.chunk_size);
        Ok(self.pending.drain(..n).collect())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn host(&self) -> &str {
        "router"
    }

    fn port(&self) -> u16 {
        22
    }
}
