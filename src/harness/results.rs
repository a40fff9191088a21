//! Append-only result files.
//!
//! Two families of whitespace-padded tables are kept in the results
//! directory: `times*.csv` with one row per timed sample and `results*.csv`
//! with one row per run (the trimmed mean). Each family has a general file
//! collecting every mode plus one file per mode:
//!
//! | Mode | Per-mode suffix |
//! |------|-----------------|
//! | 1    | `Sequential`    |
//! | 2    | `ImpStandard`   |
//! | 3    | `ImpRecursive`  |
//! | 4    | `OMPLocWS`      |
//! | 5    | `OMPGlbWS`      |
//! | 6    | `OMPLocBB`      |
//! | 7    | `OMPGlbBB`      |
//!
//! A header is written to a file the first time it is empty. The first column
//! is a running index taken from the number of data rows already in the
//! general file of the family, so a row carries the same index in the general
//! and the per-mode file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::engine::Mode;
use crate::error::Result;
use crate::harness::pattern::TestPattern;
use crate::matrix::{Element, SquareMatrix};

/// Build label whose sequential averages are the speedup baseline.
pub const BASELINE_CODE: &str = "SO0";

/// Baselines below this are treated as missing.
const MIN_BASELINE_SECONDS: f64 = 1e-9;

const MISSING: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Times,
    Results,
}

impl Family {
    fn prefix(self) -> &'static str {
        match self {
            Family::Times => "times",
            Family::Results => "results",
        }
    }
}

fn mode_suffix(mode: Mode) -> &'static str {
    match mode {
        Mode::Sequential => "Sequential",
        Mode::Blocked => "ImpStandard",
        Mode::Recursive => "ImpRecursive",
        Mode::ParallelLocalWorkSharing => "OMPLocWS",
        Mode::ParallelReductionWorkSharing => "OMPGlbWS",
        Mode::ParallelLocalBlockBased => "OMPLocBB",
        Mode::ParallelReductionBlockBased => "OMPGlbBB",
    }
}

/// One row: the run parameters plus a time in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub code: String,
    pub mode: Mode,
    pub n: usize,
    pub test: TestPattern,
    pub samples: usize,
    pub threads: usize,
    pub seconds: f64,
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    /// A record stamped with the current time.
    pub fn now(
        code: impl Into<String>,
        mode: Mode,
        n: usize,
        test: TestPattern,
        samples: usize,
        threads: usize,
        seconds: f64,
    ) -> Self {
        Self {
            code: code.into(),
            mode,
            n,
            test,
            samples,
            threads,
            seconds,
            recorded_at: Utc::now(),
        }
    }

    fn prefix_columns(&self, index: usize) -> String {
        format!(
            "{:<10} {:<10} {:<5} {:<10} {:<10} {:<10} {:<10}",
            index,
            self.code,
            self.mode.id(),
            self.n,
            self.test.id(),
            self.samples,
            self.threads
        )
    }

    fn timestamp(&self) -> String {
        self.recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Writer and reader of the result files in one directory.
#[derive(Debug, Clone)]
pub struct ResultsStore {
    dir: PathBuf,
}

impl ResultsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `timesGeneral.csv`.
    pub fn general_times_path(&self) -> PathBuf {
        self.path(Family::Times, "General")
    }

    /// `resultsGeneral.csv`.
    pub fn general_results_path(&self) -> PathBuf {
        self.path(Family::Results, "General")
    }

    /// `times<Suffix>.csv` for `mode`.
    pub fn mode_times_path(&self, mode: Mode) -> PathBuf {
        self.path(Family::Times, mode_suffix(mode))
    }

    /// `results<Suffix>.csv` for `mode`.
    pub fn mode_results_path(&self, mode: Mode) -> PathBuf {
        self.path(Family::Results, mode_suffix(mode))
    }

    fn path(&self, family: Family, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{suffix}.csv", family.prefix()))
    }

    /// Appends one sample time to `timesGeneral.csv` and the mode's times
    /// file.
    pub fn append_sample(&self, record: &RunRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let index = data_rows(&self.general_times_path())? + 1;
        let header = format!(
            "{:<10} {:<10} {:<5} {:<10} {:<10} {:<10} {:<10} {:<15} {}",
            "N°", "Compile", "Mode", "Dimension", "Test_Mode", "Samples", "Threads", "Time(s)",
            "Timestamp"
        );
        let row = format!(
            "{} {:<15.12} {}",
            record.prefix_columns(index),
            record.seconds,
            record.timestamp()
        );

        append_row(&self.general_times_path(), &header, &row)?;
        append_row(&self.mode_times_path(record.mode), &header, &row)?;
        Ok(())
    }

    /// Appends one run average to `resultsGeneral.csv` and the mode's results
    /// file.
    ///
    /// The row carries the sequential baseline with speedup and efficiency.
    /// A sequential run is its own baseline; any other mode looks it up with
    /// [`sequential_baseline`](Self::sequential_baseline) and writes `-` in
    /// the three columns when none is recorded.
    pub fn append_average(&self, record: &RunRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let index = data_rows(&self.general_results_path())? + 1;
        let baseline = if record.mode == Mode::Sequential {
            Some(record.seconds)
        } else {
            self.sequential_baseline(record.n, record.test)?
        };

        let header = format!(
            "{:<10} {:<10} {:<5} {:<10} {:<10} {:<10} {:<10} {:<15} {:<15} {:<10} {:<10} {}",
            "N°",
            "Compile",
            "Mode",
            "Dimension",
            "Test_Mode",
            "Samples",
            "Threads",
            "Avg_Time(s)",
            "Seq_time(s)",
            "Speedup",
            "Efficiency",
            "Timestamp"
        );
        let tail = match baseline.filter(|&seq| seq >= MIN_BASELINE_SECONDS) {
            Some(seq) => {
                let speedup = seq / record.seconds;
                let efficiency = speedup / record.threads as f64 * 100.0;
                format!("{seq:<15.12} {speedup:<10.2} {efficiency:<10.2}%")
            }
            None => format!("{MISSING:<15} {MISSING:<10} {MISSING:<10}%"),
        };
        let row = format!(
            "{} {:<15.12} {} {}",
            record.prefix_columns(index),
            record.seconds,
            tail,
            record.timestamp()
        );

        append_row(&self.general_results_path(), &header, &row)?;
        append_row(&self.mode_results_path(record.mode), &header, &row)?;
        Ok(())
    }

    /// Average time of the first sequential run recorded with build label
    /// [`BASELINE_CODE`] for the same dimension and test pattern.
    ///
    /// A missing file is not an error; rows that do not parse are skipped.
    pub fn sequential_baseline(&self, n: usize, test: TestPattern) -> Result<Option<f64>> {
        let contents = match fs::read_to_string(self.mode_results_path(Mode::Sequential)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let n = n.to_string();
        let test = test.id().to_string();
        let mode = Mode::Sequential.id().to_string();

        Ok(contents.lines().find_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 8 || cols[0].parse::<usize>().is_err() {
                return None;
            }
            let matches = cols[1] == BASELINE_CODE && cols[2] == mode && cols[3] == n && cols[4] == test;
            if matches {
                cols[7].parse::<f64>().ok()
            } else {
                None
            }
        }))
    }
}

/// Rows after the header, 0 for a missing or empty file.
fn data_rows(path: &Path) -> Result<usize> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.lines().count().saturating_sub(1)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn append_row(path: &Path, header: &str, row: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{header}")?;
    }
    writeln!(file, "{row}")?;
    Ok(())
}

/// One spot-checked pair: `M[row][col]` and `T[col][row]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotCheck<T> {
    pub row: usize,
    pub col: usize,
    pub source: T,
    pub transposed: T,
}

impl<T: Element> SpotCheck<T> {
    pub fn agrees(&self) -> bool {
        self.source == self.transposed
    }
}

/// Reads three fixed positions of `m` and the mirrored cells of `t`:
/// `(1, 2)`, `(n/2 - 4, n/2 + 2)` and `(n - 5, n - 3)`.
///
/// Returns nothing for matrices smaller than 8.
pub fn spot_check<T: Element>(m: &SquareMatrix<T>, t: &SquareMatrix<T>) -> Vec<SpotCheck<T>> {
    let n = m.dim().min(t.dim());
    if n < 8 {
        return Vec::new();
    }
    [(1, 2), (n / 2 - 4, n / 2 + 2), (n - 5, n - 3)]
        .into_iter()
        .map(|(row, col)| SpotCheck {
            row,
            col,
            source: m.get(row, col),
            transposed: t.get(col, row),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::allocate;
    use crate::transpose::transpose;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "symtrans-results-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn record(code: &str, mode: Mode, seconds: f64, threads: usize) -> RunRecord {
        RunRecord::now(code, mode, 1024, TestPattern::Static, 25, threads, seconds)
    }

    #[test]
    fn test_file_names() {
        let store = ResultsStore::new("out");
        assert_eq!(store.general_times_path(), Path::new("out/timesGeneral.csv"));
        assert_eq!(store.general_results_path(), Path::new("out/resultsGeneral.csv"));
        assert_eq!(
            store.mode_times_path(Mode::ParallelLocalWorkSharing),
            Path::new("out/timesOMPLocWS.csv")
        );
        assert_eq!(
            store.mode_results_path(Mode::Blocked),
            Path::new("out/resultsImpStandard.csv")
        );
    }

    #[test]
    fn test_samples_get_header_and_running_index() {
        let dir = scratch_dir("samples");
        let store = ResultsStore::new(&dir);
        store.append_sample(&record("O2", Mode::Blocked, 0.5, 1)).unwrap();
        store.append_sample(&record("O2", Mode::Recursive, 0.25, 1)).unwrap();

        let general = fs::read_to_string(store.general_times_path()).unwrap();
        let lines: Vec<&str> = general.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("N°"));
        assert!(lines[1].starts_with("1 "));
        assert!(lines[2].starts_with("2 "));
        assert!(lines[2].contains("0.250000000000"));

        let recursive = fs::read_to_string(store.mode_times_path(Mode::Recursive)).unwrap();
        assert_eq!(recursive.lines().count(), 2);
        assert!(recursive.lines().nth(1).unwrap().starts_with("2 "));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_average_without_baseline_uses_dashes() {
        let dir = scratch_dir("no-baseline");
        let store = ResultsStore::new(&dir);
        store
            .append_average(&record("O2", Mode::ParallelLocalBlockBased, 0.1, 4))
            .unwrap();

        let row = fs::read_to_string(store.mode_results_path(Mode::ParallelLocalBlockBased))
            .unwrap()
            .lines()
            .nth(1)
            .unwrap()
            .to_string();
        let cols: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(&cols[8..12], &["-", "-", "-", "%"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_speedup_against_sequential_baseline() {
        let dir = scratch_dir("baseline");
        let store = ResultsStore::new(&dir);
        // not the baseline label
        store.append_average(&record("O3", Mode::Sequential, 9.0, 1)).unwrap();
        store.append_average(&record(BASELINE_CODE, Mode::Sequential, 2.0, 1)).unwrap();
        assert_eq!(store.sequential_baseline(1024, TestPattern::Static).unwrap(), Some(2.0));
        assert_eq!(store.sequential_baseline(2048, TestPattern::Static).unwrap(), None);

        store
            .append_average(&record("O2", Mode::ParallelReductionWorkSharing, 0.5, 2))
            .unwrap();
        let general = fs::read_to_string(store.general_results_path()).unwrap();
        let last = general.lines().last().unwrap();
        let cols: Vec<&str> = last.split_whitespace().collect();
        assert_eq!(cols[0], "3");
        assert_eq!(cols[8].parse::<f64>().unwrap(), 2.0);
        assert_eq!(cols[9], "4.00");
        assert_eq!(cols[10], "200.00");
        assert_eq!(cols[11], "%");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_baseline_file() {
        let store = ResultsStore::new(scratch_dir("missing"));
        assert_eq!(store.sequential_baseline(64, TestPattern::Worst).unwrap(), None);
    }

    #[test]
    fn test_spot_check() {
        let mut m = allocate::<f32>(16).unwrap();
        m.fill_with(|i, j| (i * 16 + j) as f32);
        let mut t = allocate::<f32>(16).unwrap();
        transpose(&m, &mut t);

        let checks = spot_check(&m, &t);
        let positions: Vec<(usize, usize)> = checks.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(positions, vec![(1, 2), (4, 10), (11, 13)]);
        assert!(checks.iter().all(SpotCheck::agrees));

        t.set(10, 4, -1.0);
        assert!(!spot_check(&m, &t)[1].agrees());
    }
}
