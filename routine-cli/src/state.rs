use anyhow::{bail, Context, Result};
use routine_core::{
    Catalog, Product, RotationUsageBook, RoutineEngine, RulesState, SeededState, TaskDefinition,
    TaskStatusBook,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub type Engine = RoutineEngine<TaskStatusBook, RotationUsageBook>;

pub const PRODUCTS_FILE: &str = "products.json";
pub const TASKS_FILE: &str = "tasks.json";
pub const RULES_FILE: &str = "rules.json";
pub const STATUS_FILE: &str = "task_status.json";
pub const USAGE_FILE: &str = "rotation_usage.json";
const LOCK_FILE: &str = ".lock";

/// `$ROUTINE_HOME`, else `~/.routine`.
pub fn routine_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("ROUTINE_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".routine"))
}

/// One JSON file per sub-document under a single directory.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

/// Exclusive `flock` on the state directory's lock file for one
/// read-compute-write cycle. The kernel releases it when the file is closed,
/// including when the process dies.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}

#[cfg(not(unix))]
fn try_lock_exclusive(_: &File) -> io::Result<bool> {
    Ok(true)
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn is_initialized(&self) -> bool {
        [PRODUCTS_FILE, TASKS_FILE, RULES_FILE]
            .iter()
            .all(|name| self.path(name).exists())
    }

    pub fn lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.root).with_context(|| format!("create {}", self.root.display()))?;
        let path = self.path(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        if !try_lock_exclusive(&file).with_context(|| format!("lock {}", path.display()))? {
            bail!("another routine command is using {}", self.root.display());
        }
        file.set_len(0).with_context(|| format!("truncate {}", path.display()))?;
        writeln!(file, "{}", std::process::id()).with_context(|| format!("write {}", path.display()))?;
        debug!(lock = %path.display(), "state lock acquired");
        Ok(StateLock { _file: file })
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let p = self.path(name);
        let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
    }

    fn read_json_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        if !self.path(name).exists() {
            return Ok(T::default());
        }
        self.read_json(name)
    }

    /// Serialize `value` into a temp file next to `name`. Nothing is visible
    /// until [`StateDir::publish`] renames it into place.
    fn stage<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).with_context(|| format!("create {}", self.root.display()))?;
        let tmp = self.path(&format!(".{name}.tmp-{}", std::process::id()));
        let json = serde_json::to_string_pretty(value).with_context(|| format!("serialize {name}"))?;
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        Ok(tmp)
    }

    fn publish(&self, tmp: &Path, name: &str) -> Result<()> {
        let p = self.path(name);
        fs::rename(tmp, &p).with_context(|| format!("rename {} -> {}", tmp.display(), p.display()))?;
        debug!(file = %p.display(), "saved");
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let tmp = self.stage(name, value)?;
        self.publish(&tmp, name)
    }

    pub fn write_seeded(&self, seeded: &SeededState) -> Result<()> {
        self.save_products(&seeded.catalog.products)?;
        self.save_tasks(&seeded.catalog.tasks)?;
        self.save_rules(&seeded.rules)?;
        self.save_status(&seeded.status)?;
        self.save_usage(&seeded.usage)?;
        Ok(())
    }

    pub fn load_engine(&self) -> Result<Engine> {
        if !self.is_initialized() {
            bail!(
                "No routine state at {}. Run: routine init",
                self.root.display()
            );
        }
        let products: Vec<Product> = self.read_json(PRODUCTS_FILE)?;
        let tasks: Vec<TaskDefinition> = self.read_json(TASKS_FILE)?;
        let rules: RulesState = self.read_json(RULES_FILE)?;
        let status: TaskStatusBook = self.read_json_or_default(STATUS_FILE)?;
        let usage: RotationUsageBook = self.read_json_or_default(USAGE_FILE)?;
        Ok(RoutineEngine::new(Catalog::new(products, tasks), rules, status, usage))
    }

    pub fn save_products(&self, products: &[Product]) -> Result<()> {
        self.write_json(PRODUCTS_FILE, products)
    }

    pub fn save_tasks(&self, tasks: &[TaskDefinition]) -> Result<()> {
        self.write_json(TASKS_FILE, tasks)
    }

    pub fn save_rules(&self, rules: &RulesState) -> Result<()> {
        self.write_json(RULES_FILE, rules)
    }

    pub fn save_status(&self, status: &TaskStatusBook) -> Result<()> {
        self.write_json(STATUS_FILE, status)
    }

    pub fn save_usage(&self, usage: &RotationUsageBook) -> Result<()> {
        self.write_json(USAGE_FILE, usage)
    }

    /// Save status and usage from one recorded event. Both files are staged
    /// before either is renamed, so a failed write leaves both untouched.
    pub fn save_event(&self, status: &TaskStatusBook, usage: &RotationUsageBook) -> Result<()> {
        let status_tmp = self.stage(STATUS_FILE, status)?;
        let usage_tmp = match self.stage(USAGE_FILE, usage) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&status_tmp);
                return Err(e);
            }
        };
        self.publish(&usage_tmp, USAGE_FILE)?;
        self.publish(&status_tmp, STATUS_FILE)
    }
}
