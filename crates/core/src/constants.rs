/// Constants used throughout the provenant codebase
// Root directory layout
pub const ROOT_DIR_NAME: &str = ".provenant";
pub const RECORDS_DIR: &str = "records";
pub const UID_TABLE_FILENAME: &str = "run-data.json";
pub const UID_TABLE_LOCK_FILENAME: &str = "run-data.lock";
pub const EXTERNAL_FILES_DIR: &str = "external_files";
pub const WORK_DIRS_FILENAME: &str = "work_dirs.json";
pub const WORK_DIRS_LOCK_FILENAME: &str = "work_dirs.lock";
pub const WORK_DIR: &str = "work";
pub const PARAMS_FILENAME: &str = "params.json";
pub const CONFIG_FILENAME: &str = "config.json";

// Legacy flat result files
pub const LEGACY_RESULTS_PREFIX: &str = "results-";

// Number of uid characters used in file names
pub const UID_PREFIX_LEN: usize = 10;

// Instruction naming
pub const STEP_SEPARATOR: &str = "::";
pub const DEFAULT_STEP: &str = "main";

// Environment variable names
pub const PROVENANT_BACKEND_VAR: &str = "PROVENANT_BACKEND";
pub const PROVENANT_POLL_INTERVAL_VAR: &str = "PROVENANT_POLL_INTERVAL_MS";
pub const PROVENANT_BARRIER_TIMEOUT_VAR: &str = "PROVENANT_BARRIER_TIMEOUT_SECS";
pub const PROVENANT_LOCK_TIMEOUT_VAR: &str = "PROVENANT_LOCK_TIMEOUT_SECS";
pub const PROVENANT_TEST_MODE_VAR: &str = "PROVENANT_TEST_MODE";
pub const PROVENANT_NCORES_VAR: &str = "PROVENANT_NCORES";
pub const RANK_VARS: &[&str] = &["PROVENANT_RANK", "OMPI_COMM_WORLD_RANK", "PMI_RANK"];

// Defaults
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;
