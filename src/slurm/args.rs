use kslurm_args::{ConfigError, Kind, Matcher, Parameter, Value, ValueError, Values};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheError;
use crate::config::ConfigFileError;
use crate::env::Environment;
use crate::shell::{double_quoted, quote, single_quoted, ShellError};
use crate::slurm::template::{find_template, template_names, JobTemplate};

/// The time limit when neither an argument nor a template gives one, in minutes.
pub const DEFAULT_TIME: u32 = 180;
/// The cpus per task when neither an argument nor a template gives one.
pub const DEFAULT_CPU: u32 = 1;
/// The memory when neither an argument nor a template gives one, in megabytes.
pub const DEFAULT_MEM: u32 = 4000;

const TIME_PATTERN: &str = r"^(?:([0-9]+)-)?([0-9]{1,2}):([0-9]{2})$";
const MEM_PATTERN: &str = r"^([0-9]+)([GgMm])[Bb]?$";
const CPU_PATTERN: &str = r"^[0-9]+$";

fn compiled(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| match Regex::new(source) {
        Ok(regex) => regex,
        Err(error) => unreachable!("internal error - invalid pattern '{source}': {error}"),
    })
}

/// Read `[d-]hh:mm` as minutes.
pub fn parse_time(token: &str) -> Result<u32, String> {
    static TIME: OnceLock<Regex> = OnceLock::new();
    let captures = compiled(&TIME, TIME_PATTERN)
        .captures(token)
        .ok_or_else(|| format!("'{token}' is not of the form [d-]hh:mm."))?;
    let number = |index: usize| -> Result<u32, String> {
        captures
            .get(index)
            .map(|m| m.as_str().parse::<u32>())
            .unwrap_or(Ok(0))
            .map_err(|_| format!("'{token}' is too large."))
    };
    let (days, hours, minutes) = (number(1)?, number(2)?, number(3)?);

    if minutes >= 60 {
        return Err(format!("'{token}' has more than 59 minutes."));
    }

    days.checked_mul(24 * 60)
        .and_then(|d| d.checked_add(hours * 60 + minutes))
        .ok_or_else(|| format!("'{token}' is too large."))
}

/// Write minutes as `HH:MM:SS`, or `D-HH:MM:SS` from one day up.
pub fn format_time(minutes: u32) -> String {
    let (days, hours, minutes) = (minutes / (24 * 60), (minutes / 60) % 24, minutes % 60);

    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:00")
    } else {
        format!("{hours:02}:{minutes:02}:00")
    }
}

/// Read `<n>G` or `<n>M` (an optional trailing `B` is allowed) as megabytes; `G` is 1000 megabytes.
pub fn parse_mem(token: &str) -> Result<u32, String> {
    static MEM: OnceLock<Regex> = OnceLock::new();
    let captures = compiled(&MEM, MEM_PATTERN)
        .captures(token)
        .ok_or_else(|| format!("'{token}' is not of the form <n>[G|M]."))?;
    let amount = captures[1]
        .parse::<u32>()
        .map_err(|_| format!("'{token}' is too large."))?;
    let factor = match &captures[2] {
        "G" | "g" => 1000,
        _ => 1,
    };

    amount
        .checked_mul(factor)
        .ok_or_else(|| format!("'{token}' is too large."))
}

/// No SLURM account could be determined, or the lookup failed.
#[derive(Debug, Error)]
pub enum SlurmError {
    /// Nothing names an account.
    #[error("Could not determine a SLURM account. Pass --account, or set one with 'kslurm config account <ACCOUNT>'.")]
    NoAccount,
    /// The config file is unreadable.
    #[error(transparent)]
    Config(#[from] ConfigFileError),
    /// The cache is unreadable.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The account probe could not run.
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// The resource arguments shared by every submitting command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlurmRequest {
    /// Time limit, in minutes.
    pub time: Option<u32>,
    /// Cpus per task.
    pub cpu: Option<u32>,
    /// Memory, in megabytes.
    pub mem: Option<u32>,
    /// Request one gpu.
    pub gpu: bool,
    /// Forward X11.
    pub x11: bool,
    /// Print the command rather than run it.
    pub test: bool,
    /// The job templates, in input order; the last one applies.
    pub job_template: Vec<String>,
    /// The SLURM account.
    pub account: Option<String>,
    /// The job name.
    pub job_name: Option<String>,
}

impl SlurmRequest {
    /// Declare the resource parameters.
    pub fn parameters() -> Result<Vec<(&'static str, Parameter)>, ConfigError> {
        Ok(vec![
            (
                "time",
                Parameter::shape(Matcher::regex(TIME_PATTERN)?)
                    .syntax("[d-]hh:mm")
                    .help("The time limit (default: 03:00).")
                    .example("07:23")
                    .example("1-00:00")
                    .convert(|token| parse_time(token).map(Value::from))
                    .optional(),
            ),
            (
                "gpu",
                Parameter::flag(["gpu"]).help("Request a gpu."),
            ),
            (
                "cpu",
                Parameter::shape(Matcher::regex(CPU_PATTERN)?)
                    .syntax("<cpus>")
                    .help("The number of cpus per task (default: 1).")
                    .validate(|token| {
                        if token.trim_start_matches('0').is_empty() {
                            Err("at least 1 cpu is required.".to_string())
                        } else {
                            Ok(())
                        }
                    })
                    .kind(Kind::Int)
                    .optional(),
            ),
            (
                "mem",
                Parameter::shape(Matcher::regex(MEM_PATTERN)?)
                    .syntax("<n>[G|M]")
                    .help("The memory (default: 4000M); 1G is 1000M.")
                    .example("16G")
                    .convert(|token| parse_mem(token).map(Value::from))
                    .optional(),
            ),
            (
                "x11",
                Parameter::flag(["--x11"]).help("Forward X11 to the job."),
            ),
            (
                "test",
                Parameter::flag(["-t", "--test"]).help("Print the command instead of running it."),
            ),
            (
                "job_template",
                Parameter::keyword_list(["-j", "--job-template"], Some(1))
                    .metavar("TEMPLATE")
                    .help(format!(
                        "A set of resources ({}); explicit arguments take precedence.",
                        template_names()
                    ))
                    .validate(|token| match find_template(token) {
                        Some(_) => Ok(()),
                        None => Err(format!(
                            "'{token}' is not a job template (choose from: {}).",
                            template_names()
                        )),
                    })
                    .optional(),
            ),
            (
                "account",
                Parameter::keyword(["-a", "--account"])
                    .metavar("ACCOUNT")
                    .help("The SLURM account.")
                    .optional(),
            ),
            (
                "job_name",
                Parameter::keyword(["-n", "--name"])
                    .metavar("NAME")
                    .help("The job name.")
                    .optional(),
            ),
        ])
    }

    /// Take the resource values.
    pub fn from_values(values: &mut Values) -> Result<Self, ValueError> {
        Ok(SlurmRequest {
            time: values.take_optional("time")?,
            cpu: values.take_optional("cpu")?,
            mem: values.take_optional("mem")?,
            gpu: values.take("gpu")?,
            x11: values.take("x11")?,
            test: values.take("test")?,
            job_template: values.take_optional("job_template")?.unwrap_or_default(),
            account: values.take_optional("account")?,
            job_name: values.take_optional("job_name")?,
        })
    }

    /// The template in effect: the last one given.
    pub fn template(&self) -> Option<&'static JobTemplate> {
        self.job_template.last().and_then(|name| find_template(name))
    }

    /// Settle every resource: explicit argument, else the job template, else the default.
    pub fn resolve(&self, environment: &Environment) -> Result<Resources, SlurmError> {
        let template = self.template();
        let resources = Resources {
            account: self.account(environment)?,
            time: self.time.or(template.map(|t| t.time)).unwrap_or(DEFAULT_TIME),
            cpu: self.cpu.or(template.map(|t| t.cpu)).unwrap_or(DEFAULT_CPU),
            mem: self.mem.or(template.map(|t| t.mem)).unwrap_or(DEFAULT_MEM),
            gpu: self.gpu,
            x11: self.x11,
            job_name: self.job_name.clone(),
            parsable: false,
            output: None,
        };
        debug!("Resolved {self:?} to {resources:?}.");
        Ok(resources)
    }

    // --account, else the configured account for the job type, else the configured account, else the probe.
    fn account(&self, environment: &Environment) -> Result<String, SlurmError> {
        if let Some(account) = &self.account {
            return Ok(account.clone());
        }

        let config = environment.config()?;
        let key = if self.gpu { "account.gpu" } else { "account.cpu" };

        match config.get(key).or_else(|| config.get("account")) {
            Some(account) => Ok(account.to_string()),
            None => probe_account(environment),
        }
    }
}

// Ask `sshare` for the user's first account, remembering the answer.
fn probe_account(environment: &Environment) -> Result<String, SlurmError> {
    let user = environment.user().ok_or(SlurmError::NoAccount)?;
    let cache = environment.cache();
    let key = format!("sshare-account:{user}");

    if let Some(account) = cache.get(&key)? {
        if !account.trim().is_empty() {
            return Ok(account.trim().to_string());
        }
    }

    let captured = environment.shell().capture(&format!(
        "sshare -U -u {} --format=Account --noheader --parsable2",
        quote(user)
    ))?;

    if !captured.success() {
        warn!("sshare exited with {}; no account found.", captured.code);
        return Err(SlurmError::NoAccount);
    }

    let account = captured
        .stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(SlurmError::NoAccount)?
        .to_string();
    info!("Using SLURM account '{account}' for {user}.");
    cache.put(&key, &account)?;
    Ok(account)
}

/// Fully settled resources for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    /// The SLURM account.
    pub account: String,
    /// Time limit, in minutes.
    pub time: u32,
    /// Cpus per task.
    pub cpu: u32,
    /// Memory, in megabytes.
    pub mem: u32,
    /// Request one gpu.
    pub gpu: bool,
    /// Forward X11.
    pub x11: bool,
    /// The job name.
    pub job_name: Option<String>,
    /// Have `sbatch` print only the job id.
    pub parsable: bool,
    /// The log file pattern.
    pub output: Option<String>,
}

impl Resources {
    /// The SLURM flags, in their fixed order.
    pub fn flags(&self) -> String {
        let mut flags = vec![
            format!("--account={}", quote(&self.account)),
            format!("--time={}", format_time(self.time)),
            format!("--cpus-per-task={}", self.cpu),
            format!("--mem={}", self.mem),
        ];

        if self.gpu {
            flags.push("--gres=gpu:1".to_string());
        }

        if self.x11 {
            flags.push("--x11".to_string());
        }

        if let Some(name) = &self.job_name {
            flags.push(format!("--job-name={}", single_quoted(name)));
        }

        if self.parsable {
            flags.push("--parsable".to_string());
        }

        if let Some(output) = &self.output {
            flags.push(format!("--output={}", double_quoted(output)));
        }

        flags.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{Captured, RecordingShell};
    use kslurm_args::InMemoryInterface;
    use rstest::rstest;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[rstest]
    #[case("07:23", 443)]
    #[case("0:05", 5)]
    #[case("24:00", 1440)]
    #[case("1-00:00", 1440)]
    #[case("3-12:30", 5070)]
    fn time(#[case] token: &str, #[case] minutes: u32) {
        assert_eq!(parse_time(token), Ok(minutes));
    }

    #[rstest]
    #[case("7:60")]
    #[case("07")]
    #[case("1-7")]
    #[case("a:00")]
    fn time_invalid(#[case] token: &str) {
        assert_matches!(parse_time(token), Err(_));
    }

    #[rstest]
    #[case(443, "07:23:00")]
    #[case(180, "03:00:00")]
    #[case(1440, "1-00:00:00")]
    #[case(5070, "3-12:30:00")]
    fn time_format(#[case] minutes: u32, #[case] expected: &str) {
        assert_eq!(format_time(minutes), expected);
    }

    #[rstest]
    #[case("16G", 16000)]
    #[case("16gb", 16000)]
    #[case("500M", 500)]
    #[case("500MB", 500)]
    fn mem(#[case] token: &str, #[case] megabytes: u32) {
        assert_eq!(parse_mem(token), Ok(megabytes));
    }

    #[rstest]
    #[case("16")]
    #[case("16T")]
    #[case("G")]
    #[case("99999999G")]
    fn mem_invalid(#[case] token: &str) {
        assert_matches!(parse_mem(token), Err(_));
    }

    fn environment(root: &std::path::Path, shell: RecordingShell) -> Environment {
        Environment::rooted(root, Rc::new(shell), Rc::new(InMemoryInterface::default()))
            .with_user(Some("tester".to_string()))
    }

    #[test]
    fn resolve_precedence() {
        // Setup
        let dir = TempDir::new().unwrap();
        let environment = environment(dir.path(), RecordingShell::default());
        let request = SlurmRequest {
            time: Some(443),
            cpu: Some(3),
            gpu: true,
            job_template: vec!["Short".to_string(), "Regular".to_string()],
            account: Some("def-lab".to_string()),
            ..SlurmRequest::default()
        };

        // Execute
        let resources = request.resolve(&environment).unwrap();

        // Verify
        assert_eq!(
            resources,
            Resources {
                account: "def-lab".to_string(),
                time: 443,
                cpu: 3,
                mem: 128000,
                gpu: true,
                x11: false,
                job_name: None,
                parsable: false,
                output: None,
            }
        );
    }

    #[test]
    fn resolve_defaults() {
        let dir = TempDir::new().unwrap();
        let environment = environment(dir.path(), RecordingShell::default());
        let request = SlurmRequest {
            account: Some("def-lab".to_string()),
            ..SlurmRequest::default()
        };
        let resources = request.resolve(&environment).unwrap();
        assert_eq!(
            (resources.time, resources.cpu, resources.mem),
            (DEFAULT_TIME, DEFAULT_CPU, DEFAULT_MEM)
        );
    }

    #[rstest]
    #[case(false, "def-cpu")]
    #[case(true, "def-gpu")]
    fn account_by_job_type(#[case] gpu: bool, #[case] expected: &str) {
        // Setup
        let dir = TempDir::new().unwrap();
        let environment = environment(dir.path(), RecordingShell::default());
        let mut config = environment.config().unwrap();
        config.set("account", "def-any").unwrap();
        config.set("account.cpu", "def-cpu").unwrap();
        config.set("account.gpu", "def-gpu").unwrap();
        let request = SlurmRequest {
            gpu,
            ..SlurmRequest::default()
        };

        // Execute
        let resources = request.resolve(&environment).unwrap();

        // Verify
        assert_eq!(resources.account, expected);
    }

    #[test]
    fn account_fallback() {
        let dir = TempDir::new().unwrap();
        let environment = environment(dir.path(), RecordingShell::default());
        environment.config().unwrap().set("account", "def-any").unwrap();
        let request = SlurmRequest {
            gpu: true,
            ..SlurmRequest::default()
        };
        assert_eq!(request.resolve(&environment).unwrap().account, "def-any");
    }

    #[test]
    fn account_probe_cached() {
        // Setup
        let dir = TempDir::new().unwrap();
        let shell = RecordingShell::default().respond("sshare", Captured::ok("\ndef-probed\ndef-second\n"));
        let environment = environment(dir.path(), shell.clone());

        // Execute
        let first = SlurmRequest::default().resolve(&environment).unwrap();
        let second = SlurmRequest::default().resolve(&environment).unwrap();

        // Verify
        assert_eq!(first.account, "def-probed");
        assert_eq!(second.account, "def-probed");
        assert_eq!(
            shell.commands(),
            vec!["sshare -U -u tester --format=Account --noheader --parsable2".to_string()]
        );
    }

    #[rstest]
    #[case(Captured::default())]
    #[case(Captured { code: 1, stdout: "def-x".to_string() })]
    fn account_missing(#[case] answer: Captured) {
        let dir = TempDir::new().unwrap();
        let environment = environment(dir.path(), RecordingShell::default().respond("sshare", answer));
        assert_matches!(SlurmRequest::default().resolve(&environment), Err(SlurmError::NoAccount));
    }

    #[test]
    fn flags_order() {
        // Setup
        let resources = Resources {
            account: "def-lab".to_string(),
            time: 1440,
            cpu: 1,
            mem: 16000,
            gpu: true,
            x11: true,
            job_name: Some("my job".to_string()),
            parsable: true,
            output: Some("logs/%j.log".to_string()),
        };

        // Execute
        let flags = resources.flags();

        // Verify
        assert_eq!(
            flags,
            "--account=def-lab --time=1-00:00:00 --cpus-per-task=1 --mem=16000 --gres=gpu:1 --x11 --job-name='my job' --parsable --output=\"logs/%j.log\""
        );
    }

    #[test]
    fn output_escaped() {
        let resources = Resources {
            account: "def-lab".to_string(),
            time: 60,
            cpu: 1,
            mem: 4000,
            gpu: false,
            x11: false,
            job_name: None,
            parsable: false,
            output: Some("$(rm -rf ~)/\"%j`x`\".log".to_string()),
        };
        assert_eq!(
            resources.flags(),
            concat!(
                "--account=def-lab --time=01:00:00 --cpus-per-task=1 --mem=4000 ",
                r#"--output="\$(rm -rf ~)/\"%j\`x\`\".log""#
            )
        );
    }
}
