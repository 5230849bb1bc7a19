//! Shell-command deny list.
//!
//! A command matching any pattern is refused outright; everything else passes
//! through to the shell tool (which still runs under the workspace cwd and
//! timeout caps). Patterns cover destructive filesystem operations, fork
//! bombs, credential exfiltration, listeners and reverse tunnels, privilege
//! escalation, and download-to-shell pipes, for both POSIX and Windows
//! shells.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CoreError, Result};

static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn patterns() -> &'static [(Regex, &'static str)] {
    PATTERNS.get_or_init(|| {
        let table: &[(&str, &str)] = &[
            // Destructive filesystem
            (r"(?i)\brm\s+(-[a-z]+\s+)*-[a-z]*[rf][a-z]*\s+(-[a-z]+\s+)*/\s*($|\*)", "recursive delete of filesystem root"),
            (r"(?i)\brm\s+(-[a-z]+\s+)*-[a-z]*[rf][a-z]*\s+(-[a-z]+\s+)*(/(etc|usr|var|boot|bin|sbin|lib|home|root)\b|~|\$HOME)", "recursive delete outside the workspace"),
            (r"(?i)\bmkfs(\.[a-z0-9]+)?\b", "filesystem format"),
            (r"(?i)\bdd\s+if=", "raw disk write"),
            (r"(?i)\bformat\s+[a-z]:", "drive format"),
            (r"(?i)\bdel\s+/s\s+/q", "recursive Windows delete"),
            // Fork bomb
            (r":\(\)\s*\{", "fork bomb"),
            // Credential exfiltration
            (r"(?i)\bcat\s+[^|;&]*\.(env|pem|key|secret|token|credentials?)\b", "credential file read"),
            (r"(?i)\b(curl|wget)\b[^|;&]*(169\.254\.169\.254|100\.100\.100\.200|metadata\.google\.internal)", "cloud metadata access"),
            // Listeners / tunnels
            (r"(?i)\b(nc|ncat|netcat|socat)\b.*(\s-l\b|listen)", "network listener"),
            (r"(?i)\bssh\b.*\s-R\s", "reverse SSH tunnel"),
            // Privilege escalation
            (r"(?i)\bchmod\b.*(\+s\b|\b[24][0-7]{3}\b)", "setuid/setgid chmod"),
            (r"(?i)\bchown\b.*\broot\b", "chown to root"),
            (r"(?i)\bexport\s+\w*(_KEY|SECRET|TOKEN|PASSWORD)\w*=", "secret export"),
            // Process / device access
            (r"/proc/self", "process self-inspection"),
            (r"/dev/(tcp|udp)/", "raw socket via /dev"),
            // Download-to-shell
            (r"(?i)\bbase64\b.*\|\s*(sh|bash|zsh)\b", "base64-decoded shell pipe"),
            (r"(?i)\b(curl|wget)\b.*\|\s*(sh|bash|zsh|python3?|eval)\b", "download piped into interpreter"),
            // Windows administration
            (r"(?i)\breg\s+(add|delete)\b", "registry modification"),
            (r"(?i)\bnet\s+(user|localgroup)\b", "Windows account modification"),
            (r"(?i)powershell\b.*\s-enc", "encoded PowerShell"),
        ];
        table
            .iter()
            .map(|(pat, reason)| {
                let re = Regex::new(pat)
                    .unwrap_or_else(|e| panic!("shell filter pattern '{pat}' must compile: {e}"));
                (re, *reason)
            })
            .collect()
    })
}

/// Reject `command` if it matches any deny pattern.
pub fn validate_shell_command(command: &str) -> Result<()> {
    for (pattern, reason) in patterns() {
        if pattern.is_match(command) {
            return Err(CoreError::security(format!("command blocked: {reason}")));
        }
    }
    Ok(())
}
