use clap::Parser;

/// Optimization level, mirroring the three compile-time tiers a pipeline
/// can be built at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OptLevel {
    None,
    Less,
    Default,
    Aggressive,
}

/// How kernel segments are driven across OS threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum ThreadingMode {
    #[default]
    SingleThreaded,
    SegmentParallel,
    PipelineParallel,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "streamforge", about = "JIT-compiled streaming dataflow pipeline driver")]
pub struct Cli {
    #[arg(long)]
    pub enable_object_cache: bool,

    #[arg(long)]
    pub object_cache_dir: Option<String>,

    #[arg(long, value_enum, default_value = "default")]
    pub opt_level: OptLevel,

    #[arg(long, default_value_t = 8192)]
    pub segment_size: u64,

    #[arg(long, default_value_t = 1)]
    pub buffer_segments: u32,

    #[arg(long, value_enum, default_value = "single-threaded")]
    pub threading_mode: ThreadingMode,

    #[arg(long, default_value_t = 1)]
    pub thread_num: u32,

    #[arg(long)]
    pub enable_asserts: bool,

    #[arg(long)]
    pub show_ir: bool,

    #[arg(long)]
    pub show_asm: bool,

    #[arg(long)]
    pub show_kernel_cycles: bool,

    #[arg(long)]
    pub enable_blocking_io_counter: bool,

    #[arg(long)]
    pub trace_blocked_io: bool,

    #[arg(long)]
    pub trace_dynamic_buffers: bool,

    #[arg(long)]
    pub enable_mprotect: bool,
}

/// Resolved runtime configuration, derived from [`Cli`] (or built directly
/// by an embedder that never goes through argv).
#[derive(Debug, Clone)]
pub struct Config {
    pub enable_object_cache: bool,
    pub object_cache_dir: Option<String>,
    pub opt_level: OptLevel,
    pub segment_size: u64,
    pub buffer_segments: u32,
    pub threading_mode: ThreadingMode,
    pub thread_num: u32,
    pub enable_asserts: bool,
    pub show_ir: bool,
    pub show_asm: bool,
    pub show_kernel_cycles: bool,
    pub enable_blocking_io_counter: bool,
    pub trace_blocked_io: bool,
    pub trace_dynamic_buffers: bool,
    pub enable_mprotect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_object_cache: false,
            object_cache_dir: None,
            opt_level: OptLevel::Default,
            segment_size: 8192,
            buffer_segments: 1,
            threading_mode: ThreadingMode::SingleThreaded,
            thread_num: 1,
            enable_asserts: true,
            show_ir: false,
            show_asm: false,
            show_kernel_cycles: false,
            enable_blocking_io_counter: false,
            trace_blocked_io: false,
            trace_dynamic_buffers: false,
            enable_mprotect: false,
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            enable_object_cache: cli.enable_object_cache,
            object_cache_dir: cli.object_cache_dir,
            opt_level: cli.opt_level,
            segment_size: cli.segment_size,
            buffer_segments: cli.buffer_segments,
            threading_mode: cli.threading_mode,
            thread_num: cli.thread_num.max(1),
            enable_asserts: cli.enable_asserts,
            show_ir: cli.show_ir,
            show_asm: cli.show_asm,
            show_kernel_cycles: cli.show_kernel_cycles,
            enable_blocking_io_counter: cli.enable_blocking_io_counter,
            trace_blocked_io: cli.trace_blocked_io,
            trace_dynamic_buffers: cli.trace_dynamic_buffers,
            enable_mprotect: cli.enable_mprotect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_with_no_args() {
        let cli = Cli::parse_from(["streamforge"]);
        assert!(!cli.enable_object_cache);
        assert_eq!(cli.thread_num, 1);
    }

    #[test]
    fn cli_command_is_well_formed() {
        Cli::command().debug_assert();
    }
}
