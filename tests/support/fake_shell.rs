// ABOUTME: Recording RemoteShell that answers with canned output.
// ABOUTME: Lets pipeline tests observe which remote steps ran, in which order.

use async_trait::async_trait;
use gitship::ssh::{CommandOutput, RemoteShell, Result};
use parking_lot::Mutex;

pub const HOME: &str = "/home/deploy";

const DEPLOY_STATES: &str =
    "::state::absent\n::state::building\n::state::built\n::state::old-removed\n::state::running\n";

/// One command the pipeline sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub command: String,
    /// Stdin, lossily decoded. Scripts arrive here.
    pub input: String,
}

impl Call {
    pub fn text(&self) -> String {
        format!("{}\n{}", self.command, self.input)
    }

    pub fn is_script(&self) -> bool {
        self.command.ends_with("bash -s")
    }
}

struct Rule {
    needle: String,
    output: CommandOutput,
}

/// Shell whose answers are chosen by substring rules, first match wins.
pub struct FakeShell {
    rules: Vec<Rule>,
    calls: Mutex<Vec<Call>>,
}

impl FakeShell {
    /// A host where every step succeeds.
    pub fn healthy() -> Self {
        Self {
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
        .respond("printf %s \"$HOME\"", 0, HOME)
        .respond("command -v rsync", 1, "")
        .respond("docker build", 0, DEPLOY_STATES)
        .respond("nginx -t", 0, "::proxy::active\n")
    }

    /// Answer commands containing `needle` with `exit_code` and `stdout`.
    /// Rules added later take precedence.
    pub fn respond(mut self, needle: &str, exit_code: u32, stdout: &str) -> Self {
        self.rules.insert(
            0,
            Rule {
                needle: needle.to_string(),
                output: CommandOutput {
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            },
        );
        self
    }

    /// Fail commands containing `needle`.
    pub fn fail_on(self, needle: &str, exit_code: u32, stderr: &str) -> Self {
        let mut shell = self.respond(needle, exit_code, "");
        shell.rules[0].output.stderr = stderr.to_string();
        shell
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.calls().iter().any(|c| c.text().contains(needle))
    }

    pub fn find(&self, needle: &str) -> Option<Call> {
        self.calls().into_iter().find(|c| c.text().contains(needle))
    }

    fn answer(&self, command: &str, input: &[u8]) -> CommandOutput {
        let call = Call {
            command: command.to_string(),
            input: String::from_utf8_lossy(input).into_owned(),
        };
        let text = call.text();
        self.calls.lock().push(call);

        self.rules
            .iter()
            .find(|rule| text.contains(&rule.needle))
            .map(|rule| rule.output.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        Ok(self.answer(command, &[]))
    }

    async fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        Ok(self.answer(command, input))
    }
}
