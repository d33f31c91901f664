/// Generates a `LogArgs` struct whose env vars share the given prefix.
///
/// ```rust,ignore
/// revshare_cli_utils::define_log_args!("REVSHARE");
/// ```
///
/// The env-backed fields are `<PREFIX>_LOG_VERBOSITY` (numeric, 1=ERROR to 5=TRACE),
/// `<PREFIX>_LOG_FORMAT` and `<PREFIX>_LOG_DIR`. Also generates `impl Default for LogArgs`
/// and `impl From<LogArgs> for LogConfig`. The calling crate must depend on `clap` and `serde`.
#[rustfmt::skip]
#[macro_export]
macro_rules! define_log_args {
    ($prefix:literal) => {
        /// Log-related CLI arguments.
        ///
        /// Verbosity levels: 1=ERROR, 2=WARN, 3=INFO (default), 4=DEBUG, 5=TRACE.
        /// Use `-q` to suppress stdout logging entirely.
        #[derive(Debug, Clone, ::clap::Parser, ::serde::Serialize, ::serde::Deserialize)]
        #[command(next_help_heading = "Logging")]
        pub struct LogArgs {
            /// Increase logging verbosity (1=ERROR, 2=WARN, 3=INFO, 4=DEBUG, 5=TRACE).
            #[arg(
                short = 'v',
                long = "verbose",
                action = ::clap::ArgAction::Count,
                default_value = "3",
                env = concat!($prefix, "_LOG_VERBOSITY"),
                global = true
            )]
            pub level: u8,

            /// Suppress stdout logging.
            #[arg(long = "quiet", short = 'q', global = true)]
            pub stdout_quiet: bool,

            /// Stdout log format.
            #[arg(
                long = "log-format",
                default_value = "full",
                env = concat!($prefix, "_LOG_FORMAT"),
                global = true
            )]
            pub stdout_format: $crate::LogFormat,

            /// Directory for file logging (enables file logging when set).
            #[arg(long = "log-dir", env = concat!($prefix, "_LOG_DIR"), global = true)]
            pub file_directory: Option<::std::path::PathBuf>,

            /// File log format.
            #[arg(long = "log-file-format", default_value = "json", global = true)]
            pub file_format: $crate::LogFormat,

            /// File log rotation strategy.
            #[arg(long = "log-rotation", default_value = "never", global = true)]
            pub file_rotation: $crate::LogRotation,
        }

        impl Default for LogArgs {
            fn default() -> Self {
                Self {
                    level: 3,
                    stdout_quiet: false,
                    stdout_format: $crate::LogFormat::Full,
                    file_directory: None,
                    file_format: $crate::LogFormat::Json,
                    file_rotation: $crate::LogRotation::Never,
                }
            }
        }

        impl From<LogArgs> for $crate::LogConfig {
            fn from(args: LogArgs) -> Self {
                let stdout_logs = (!args.stdout_quiet)
                    .then(|| $crate::StdoutLogConfig { format: args.stdout_format });
                let file_logs = args.file_directory.map(|dir| $crate::FileLogConfig {
                    directory_path: dir,
                    format: args.file_format,
                    rotation: args.file_rotation,
                });
                Self {
                    global_level: $crate::verbosity_to_level_filter(args.level),
                    stdout_logs,
                    file_logs,
                }
            }
        }
    };
}
