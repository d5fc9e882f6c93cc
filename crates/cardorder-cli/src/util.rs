use std::{
    borrow::Cow,
    fs::File,
    io::{self, BufWriter, StdoutLock, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use cardorder_analysis::{
    card_index::CardIndex,
    experiment,
    oracle::{GradientOracle, subprocess::SubprocessOracle, time_limited::TimeLimited},
};

/// Destination of a command's report: a file, or stdout when no path is given.
#[derive(Debug)]
pub enum Output {
    Stdout(StdoutLock<'static>),
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

impl Output {
    pub fn create(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Output::Stdout(io::stdout().lock()));
        };
        let file = File::create(&path)
            .with_context(|| format!("Cannot create report file {}", path.display()))?;
        Ok(Output::File {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Where the report goes, for messages.
    pub fn label(&self) -> Cow<'_, str> {
        match self {
            Output::Stdout(_) => Cow::Borrowed("stdout"),
            Output::File { path, .. } => path.to_string_lossy(),
        }
    }

    pub fn save_json<T>(value: &T, path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize + ?Sized,
    {
        Output::create(path)?.write_json(value)
    }

    /// Writes `value` as pretty-printed JSON followed by a newline.
    pub fn write_json<T>(mut self, value: &T) -> anyhow::Result<()>
    where
        T: serde::Serialize + ?Sized,
    {
        serde_json::to_writer_pretty(&mut self, value)
            .with_context(|| format!("Cannot write JSON report to {}", self.label()))?;
        writeln!(self).with_context(|| format!("Cannot write JSON report to {}", self.label()))?;
        self.finish()
    }

    /// Writes `rows` as CSV with a header taken from the row type.
    pub fn write_csv<I, T>(self, rows: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: serde::Serialize,
    {
        let mut writer = csv::Writer::from_writer(self);
        for row in rows {
            writer.serialize(row).with_context(|| {
                format!("Cannot write CSV row to {}", writer.get_ref().label())
            })?;
        }
        let output = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Cannot write CSV rows: {}", e.error()))?;
        output.finish()
    }

    fn finish(mut self) -> anyhow::Result<()> {
        self.flush()
            .with_context(|| format!("Cannot flush report to {}", self.label()))?;
        log::info!("Wrote {}", self.label());
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(writer) => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(writer) => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

/// Reads a JSON input file; `what` names it in error messages.
pub fn read_json<T, P>(what: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Cannot open {what} {}", path.display()))?;
    serde_json::from_reader(io::BufReader::new(file))
        .with_context(|| format!("{} is not a valid {what}", path.display()))
}

pub fn read_card_index_file<P>(path: P) -> anyhow::Result<CardIndex>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    CardIndex::open(path)
        .with_context(|| format!("Failed to load card index: {}", path.display()))
}

/// Where gradient-mode commands get their surrogate model from.
#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct OracleArg {
    /// Log directory of the experiment whose surrogate model is used (defaults to LOG_DIR)
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
    /// External command that evaluates the Jacobian instead of a model file.
    /// Takes every remaining argument, so give it last.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    pub oracle_command: Vec<String>,
    /// Per-elite time limit of one oracle evaluation
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl OracleArg {
    pub fn model_dir<'a>(&'a self, log_dir: &'a Path) -> &'a Path {
        self.model_dir.as_deref().unwrap_or(log_dir)
    }
}

/// Builds the gradient oracle for a card pool of `card_index.len()` cards.
///
/// `--oracle-command` takes precedence over the model directory.
pub fn build_oracle(
    arg: &OracleArg,
    log_dir: &Path,
    card_index: &CardIndex,
) -> anyhow::Result<Box<dyn GradientOracle>> {
    let timeout = arg.timeout_secs.map(Duration::from_secs);

    if !arg.oracle_command.is_empty() {
        let mut oracle = SubprocessOracle::new(&arg.oracle_command, card_index.len())
            .context("Invalid oracle command")?;
        if let Some(timeout) = timeout {
            oracle = oracle.with_timeout(timeout);
        }
        log::info!("Using oracle command: {}", arg.oracle_command.join(" "));
        return Ok(Box::new(oracle));
    }

    let model_dir = arg.model_dir(log_dir);
    let oracle = experiment::load_surrogate_oracle(model_dir, card_index.len())
        .with_context(|| format!("Failed to load surrogate model from {}", model_dir.display()))?;
    Ok(match timeout {
        Some(timeout) => Box::new(TimeLimited::new(oracle, timeout)),
        None => oracle,
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, fs};

    use super::*;

    #[derive(serde::Serialize)]
    struct Row {
        elite_id: u32,
        inversions: u64,
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let map = BTreeMap::from([(12_u32, 3_u64), (2, 0)]);
        Output::save_json(&map, Some(path.clone())).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        let parsed: BTreeMap<u32, u64> = read_json("report", &path).unwrap();
        assert_eq!(parsed, map);

        let err = read_json::<BTreeMap<u32, u64>, _>("report", dir.path().join("missing.json"))
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot open report"));

        fs::write(&path, "[1, 2]").unwrap();
        let err = read_json::<BTreeMap<u32, u64>, _>("report", &path).unwrap_err();
        assert!(err.to_string().ends_with("is not a valid report"));
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        Output::create(Some(path.clone()))
            .unwrap()
            .write_csv([
                Row {
                    elite_id: 7,
                    inversions: 2,
                },
                Row {
                    elite_id: 8,
                    inversions: 0,
                },
            ])
            .unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "elite_id,inversions\n7,2\n8,0\n"
        );
    }

    #[test]
    fn test_model_dir_defaults_to_log_dir() {
        let log_dir = Path::new("logs/paladin");
        let arg = OracleArg::default();
        assert_eq!(arg.model_dir(log_dir), log_dir);
        let arg = OracleArg {
            model_dir: Some(PathBuf::from("logs/other")),
            ..OracleArg::default()
        };
        assert_eq!(arg.model_dir(log_dir), Path::new("logs/other"));
    }

    #[test]
    fn test_empty_model_dir_fails_to_build_oracle() {
        let dir = tempfile::tempdir().unwrap();
        let card_index =
            CardIndex::from_map(BTreeMap::from([("Sunwalker".to_owned(), 0)])).unwrap();
        let err = build_oracle(&OracleArg::default(), dir.path(), &card_index).unwrap_err();
        assert!(err.to_string().contains("Failed to load surrogate model"));
    }
}
