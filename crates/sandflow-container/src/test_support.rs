//! Scripted fakes for the command-runner and artifact-source seams.

use crate::error::{ContainerError, Result};
use crate::fetcher::ArtifactSource;
use crate::runner::{CmdOutput, CommandRunner};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type Effect = Box<dyn Fn(&str) + Send + Sync>;

struct Rule {
    pattern: String,
    responses: VecDeque<CmdOutput>,
    effect: Option<Effect>,
}

/// A [`CommandRunner`] that replies from scripted rules and records every
/// command line it sees.
///
/// Rules match by substring; the most recently added matching rule wins.
/// A rule with several responses serves them in order and repeats the last;
/// an optional effect lets a rule mimic lxc's filesystem side effects
/// (e.g. lxc-clone creating the container directory).
///
/// Unmatched host filesystem commands (mkdir, rm, mv, cp, sed, the
/// echo-append shell) are emulated in process so the code under test sees
/// real filesystem state; any other unmatched command succeeds with empty
/// output.
pub struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    argv: Mutex<Vec<Vec<String>>>,
    rules: Mutex<Vec<Rule>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            argv: Mutex::new(Vec::new()),
            rules: Mutex::new(Vec::new()),
        }
    }

    pub fn on(&self, pattern: impl Into<String>, response: CmdOutput) {
        self.on_seq(pattern, vec![response]);
    }

    pub fn on_seq(&self, pattern: impl Into<String>, responses: Vec<CmdOutput>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.into(),
            responses: responses.into(),
            effect: None,
        });
    }

    pub fn on_with_effect(
        &self,
        pattern: impl Into<String>,
        response: CmdOutput,
        effect: impl Fn(&str) + Send + Sync + 'static,
    ) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.into(),
            responses: vec![response].into(),
            effect: Some(Box::new(effect)),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded argument vectors, one per command, program first.
    pub fn argv_calls(&self) -> Vec<Vec<String>> {
        self.argv.lock().unwrap().clone()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }
}

/// Perform the host filesystem commands the crate issues through the
/// runner. Only the exact shapes used by production code are supported.
fn emulate_fs(program: &str, args: &[&str]) -> Option<CmdOutput> {
    fn operands<'a>(args: &'a [&str]) -> impl Iterator<Item = &'a str> {
        args.iter().copied().filter(|a| !a.starts_with('-'))
    }

    match program {
        "mkdir" => {
            for path in operands(args) {
                if let Err(e) = std::fs::create_dir_all(path) {
                    return Some(CmdOutput::err(e.to_string()));
                }
            }
            Some(CmdOutput::ok(""))
        }
        "rm" => {
            for path in operands(args) {
                let path = Path::new(path);
                if path.is_dir() {
                    let _ = std::fs::remove_dir_all(path);
                } else {
                    let _ = std::fs::remove_file(path);
                }
            }
            Some(CmdOutput::ok(""))
        }
        "mv" => {
            let paths: Vec<&str> = operands(args).collect();
            let [source, destination] = paths[..] else {
                return Some(CmdOutput::err("mv: bad arguments"));
            };
            match std::fs::rename(source, destination) {
                Ok(()) => Some(CmdOutput::ok("")),
                Err(e) => Some(CmdOutput::err(e.to_string())),
            }
        }
        "cp" => {
            let paths: Vec<&str> = operands(args).collect();
            let [source, destination] = paths[..] else {
                return Some(CmdOutput::err("cp: bad arguments"));
            };
            match std::fs::copy(source, destination) {
                Ok(_) => Some(CmdOutput::ok("")),
                Err(e) => Some(CmdOutput::err(e.to_string())),
            }
        }
        "sed" => {
            // sed -i s|from|to|g <file>
            let expr = args.iter().find(|a| a.starts_with("s|"))?;
            let file = args.last()?;
            let mut parts = expr.splitn(4, '|');
            parts.next();
            let from = parts.next()?;
            let to = parts.next()?;
            let content = std::fs::read_to_string(file).ok()?;
            std::fs::write(file, content.replace(from, to)).ok()?;
            Some(CmdOutput::ok(""))
        }
        "bash" if args.first() == Some(&"-c") => {
            // echo '<line>' >> <file>
            let script = args.get(1)?;
            let (echo, file) = script.split_once(" >> ")?;
            let line = echo.strip_prefix("echo ")?.trim_matches('\'');
            let mut content = std::fs::read_to_string(file).unwrap_or_default();
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(line);
            content.push('\n');
            std::fs::write(file, content).ok()?;
            Some(CmdOutput::ok(""))
        }
        _ => None,
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        self.calls.lock().unwrap().push(line.clone());
        let mut recorded = vec![program.to_string()];
        recorded.extend(args.iter().map(|a| a.to_string()));
        self.argv.lock().unwrap().push(recorded);

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().rev().find(|r| line.contains(&r.pattern)) else {
            drop(rules);
            if let Some(output) = emulate_fs(program, args) {
                return Ok(output);
            }
            return Ok(CmdOutput::ok(""));
        };
        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap()
        } else {
            rule.responses
                .front()
                .cloned()
                .unwrap_or_else(|| CmdOutput::ok(""))
        };
        if let Some(effect) = &rule.effect {
            effect(&line);
        }
        Ok(response)
    }
}

type Payload = Box<dyn Fn(&Path, &Path) -> std::io::Result<()> + Send + Sync>;

/// An [`ArtifactSource`] that materializes a canned archive layout instead
/// of touching the network, optionally failing the first N calls.
pub struct FakeArtifacts {
    fetches: AtomicUsize,
    fail_first: AtomicUsize,
    payload: Payload,
}

impl FakeArtifacts {
    /// A fetcher that lays out an extracted base container: a `base/`
    /// directory with `rootfs/` and a `config` carrying the
    /// `container_dir` placeholder.
    pub fn base_image() -> Self {
        Self::with_payload(|archive_path, extract_dir| {
            std::fs::write(archive_path, b"fake archive")?;
            let base = extract_dir.join("base");
            std::fs::create_dir_all(base.join("rootfs"))?;
            std::fs::write(
                base.join("config"),
                "lxc.rootfs = container_dir/base/rootfs\nlxc.utsname = base\n",
            )
        })
    }

    pub fn with_payload(
        payload: impl Fn(&Path, &Path) -> std::io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
            payload: Box::new(payload),
        }
    }

    pub fn fail_first(self, count: usize) -> Self {
        self.fail_first.store(count, Ordering::SeqCst);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactSource for FakeArtifacts {
    async fn fetch(&self, url: &str, archive_path: &Path, extract_dir: &Path) -> Result<()> {
        let attempt = self.fetches.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first.load(Ordering::SeqCst) {
            return Err(ContainerError::FetchFailed(format!(
                "scripted failure for {url}"
            )));
        }
        (self.payload)(archive_path, extract_dir)
            .map_err(|e| ContainerError::FetchFailed(e.to_string()))
    }
}

/// Create a container directory with the `rootfs/` subtree the constrained
/// listing mode looks for.
pub fn make_container_dir(container_path: &Path, name: &str) -> PathBuf {
    let dir = container_path.join(name);
    std::fs::create_dir_all(dir.join("rootfs")).unwrap();
    dir
}
