/*!
 * Command Dispatcher
 * Validates mutating requests and forwards them to the external tools
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::DaemonConfig;
use crate::device::Address;
use crate::error::{BluedeckError, Result};
use crate::jobs::{JobHandle, JobKind, JobRegistry};
use crate::naming::sink_name;
use crate::process::{args, CommandRunner};

/// Fire-and-confirm device actions; the effect shows up in the next snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Connect,
    Disconnect,
    Pair,
    Remove,
    Trust,
    Untrust,
}

impl Action {
    pub fn subcommand(&self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
            Action::Pair => "pair",
            Action::Remove => "remove",
            Action::Trust => "trust",
            Action::Untrust => "untrust",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand())
    }
}

impl FromStr for Action {
    type Err = BluedeckError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "connect" => Ok(Action::Connect),
            "disconnect" => Ok(Action::Disconnect),
            "pair" => Ok(Action::Pair),
            "remove" => Ok(Action::Remove),
            "trust" => Ok(Action::Trust),
            "untrust" => Ok(Action::Untrust),
            other => Err(BluedeckError::Validation(format!("unknown action: {}", other))),
        }
    }
}

/// Coerces a client-supplied volume to an integer percentage in [0,100].
///
/// Integers pass through, floats truncate toward zero and strings must
/// hold an integer literal.
pub fn parse_volume(value: &Value) -> Result<u8> {
    let raw: i128 = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i as i128
            } else if let Some(u) = n.as_u64() {
                u as i128
            } else {
                // as_f64 always succeeds for non-integer JSON numbers
                n.as_f64().map(|f| f.trunc() as i128).unwrap_or_default()
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|_| BluedeckError::Validation(format!("volume is not an integer: {:?}", s)))?,
        other => {
            return Err(BluedeckError::Validation(format!(
                "volume is not an integer: {}",
                other
            )))
        }
    };

    Ok(raw.clamp(0, 100) as u8)
}

pub struct CommandDispatcher {
    runner: Arc<dyn CommandRunner>,
    jobs: Arc<JobRegistry>,
    bluetoothctl: String,
    pactl: String,
    timeout: String,
    scan_secs: u64,
}

impl CommandDispatcher {
    pub fn new(runner: Arc<dyn CommandRunner>, jobs: Arc<JobRegistry>, config: &DaemonConfig) -> Self {
        Self {
            runner,
            jobs,
            bluetoothctl: config.bluetooth.ctl_binary.clone(),
            pactl: config.audio.pactl_binary.clone(),
            timeout: config.scan.timeout_binary.clone(),
            scan_secs: config.scan.duration().as_secs(),
        }
    }

    /// Forwards `action` for `mac` and returns whatever the tool printed.
    ///
    /// The exit status is not inspected.
    pub async fn execute(&self, action: Action, mac: &str) -> Result<String> {
        let mac: Address = mac.parse()?;
        tracing::info!("{} {}", action, mac);

        let output = self
            .runner
            .run(&self.bluetoothctl, &args(["--", action.subcommand(), mac.as_str()]))
            .await?;
        Ok(output.text)
    }

    /// Sets the A2DP sink volume. The only action whose exit status counts.
    pub async fn set_volume(&self, mac: &str, volume: &Value) -> Result<bool> {
        let mac: Address = mac.parse()?;
        let volume = parse_volume(volume)?;
        let sink = sink_name(&mac);
        tracing::info!("Setting {} to {}%", sink, volume);

        let output = self
            .runner
            .run(
                &self.pactl,
                &args(["set-sink-volume".to_string(), sink, format!("{}%", volume)]),
            )
            .await?;

        if !output.success {
            tracing::warn!("Volume change for {} failed: {}", mac, output.text.trim());
        }
        Ok(output.success)
    }

    /// Starts a bounded discovery session in the background.
    pub async fn scan_on(&self) -> JobHandle {
        let runner = Arc::clone(&self.runner);
        let program = self.timeout.clone();
        let argv = args([
            self.scan_secs.to_string(),
            self.bluetoothctl.clone(),
            "scan".to_string(),
            "on".to_string(),
        ]);
        tracing::info!("Starting {}s discovery", self.scan_secs);

        self.jobs
            .spawn(JobKind::Scan, async move { runner.run(&program, &argv).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::process::testing::ScriptedRunner;
    use crate::process::CommandOutput;
    use serde_json::json;

    fn dispatcher(runner: ScriptedRunner) -> (Arc<ScriptedRunner>, Arc<JobRegistry>, CommandDispatcher) {
        let runner = Arc::new(runner);
        let jobs = Arc::new(JobRegistry::new());
        let dispatcher = CommandDispatcher::new(runner.clone(), jobs.clone(), &DaemonConfig::default());
        (runner, jobs, dispatcher)
    }

    #[test]
    fn volume_coercion() {
        assert_eq!(parse_volume(&json!(42)).unwrap(), 42);
        assert_eq!(parse_volume(&json!(150)).unwrap(), 100);
        assert_eq!(parse_volume(&json!(-5)).unwrap(), 0);
        assert_eq!(parse_volume(&json!(70.9)).unwrap(), 70);
        assert_eq!(parse_volume(&json!(" 35 ")).unwrap(), 35);
        assert_eq!(parse_volume(&json!("250")).unwrap(), 100);
        assert_eq!(parse_volume(&json!(u64::MAX)).unwrap(), 100);
    }

    #[test]
    fn volume_rejects_non_integers() {
        for bad in [json!("abc"), json!("4.5"), json!(null), json!(true), json!([1])] {
            assert!(
                matches!(parse_volume(&bad), Err(BluedeckError::Validation(_))),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn action_names_round_trip() {
        for action in [
            Action::Connect,
            Action::Disconnect,
            Action::Pair,
            Action::Remove,
            Action::Trust,
            Action::Untrust,
        ] {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
        assert!("reboot".parse::<Action>().is_err());
    }

    #[tokio::test]
    async fn actions_forward_to_bluetoothctl() {
        let (runner, _, d) = dispatcher(ScriptedRunner::new().on(
            "bluetoothctl -- connect AA:BB:CC:DD:EE:FF",
            CommandOutput::failed("Failed to connect: org.bluez.Error.Failed\n"),
        ));

        let text = d.execute(Action::Connect, "aa:bb:cc:dd:ee:ff").await.unwrap();
        assert!(text.contains("Failed to connect"));
        assert_eq!(runner.calls(), vec!["bluetoothctl -- connect AA:BB:CC:DD:EE:FF"]);
    }

    #[tokio::test]
    async fn malformed_mac_never_reaches_the_tool() {
        let (runner, _, d) = dispatcher(ScriptedRunner::new());
        let err = d.execute(Action::Remove, "AA:BB --help").await.unwrap_err();
        assert!(matches!(err, BluedeckError::Validation(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn set_volume_clamps_and_reports_exit_status() {
        let (runner, _, d) = dispatcher(ScriptedRunner::new().on(
            "pactl set-sink-volume bluez_sink.AA_BB_CC_DD_EE_FF.a2dp_sink 100%",
            CommandOutput::ok(""),
        ));
        assert!(d.set_volume("AA:BB:CC:DD:EE:FF", &json!(150)).await.unwrap());

        assert!(d.set_volume("AA:BB:CC:DD:EE:FF", &json!(-5)).await.is_ok());
        assert_eq!(
            runner.calls().last().unwrap(),
            "pactl set-sink-volume bluez_sink.AA_BB_CC_DD_EE_FF.a2dp_sink 0%"
        );
    }

    #[tokio::test]
    async fn set_volume_failure_is_false() {
        let (_, _, d) = dispatcher(ScriptedRunner::new().on(
            "pactl set-sink-volume bluez_sink.AA_BB_CC_DD_EE_FF.a2dp_sink 40%",
            CommandOutput::failed("Failure: No such entity\n"),
        ));
        assert!(!d.set_volume("AA:BB:CC:DD:EE:FF", &json!(40)).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_volume_issues_no_call() {
        let (runner, _, d) = dispatcher(ScriptedRunner::new());
        let err = d.set_volume("AA:BB:CC:DD:EE:FF", &json!("abc")).await.unwrap_err();
        assert!(matches!(err, BluedeckError::Validation(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn scan_runs_bounded_in_background() {
        let (runner, jobs, d) = dispatcher(ScriptedRunner::new().on(
            "timeout 20 bluetoothctl scan on",
            CommandOutput::failed("Discovery started\n"),
        ));

        let handle = d.scan_on().await;
        handle.task.await.unwrap();

        assert_eq!(runner.calls(), vec!["timeout 20 bluetoothctl scan on"]);
        let job = jobs.get(handle.id).await.unwrap();
        assert_eq!(
            job.status,
            JobStatus::Finished {
                success: false,
                output: "Discovery started\n".to_string()
            }
        );
    }
}
