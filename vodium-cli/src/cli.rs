use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "HLS video-on-demand downloader",
    long_about = "Downloads every segment of an HLS media playlist with bounded parallelism,\n\
                  decrypts AES-128 protected segments and joins them, in order, into one file.\n\
                  \n\
                  Interrupted or partially failed downloads keep their segments in a hidden\n\
                  staging directory next to the output; running the same command again resumes."
)]
pub struct CliArgs {
    /// URL of the media playlist
    #[arg(help = "URL of the HLS media playlist (.m3u8)")]
    pub url: String,

    /// Output directory
    #[arg(
        short,
        long,
        help = "Directory where the downloaded file is saved (default: current directory)"
    )]
    pub output_dir: Option<PathBuf>,

    /// Output file name
    #[arg(
        short = 'n',
        long = "name",
        default_value = vodium_engine::hls::config::DEFAULT_OUTPUT_NAME,
        help = "File name of the assembled output"
    )]
    pub name: String,

    /// Number of concurrent segment downloads
    #[arg(
        short = 't',
        long,
        help = "Number of concurrent segment downloads (default: available CPU parallelism)"
    )]
    pub threads: Option<usize>,

    #[arg(short = 'c', long, help = "Cookie header value sent with every request")]
    pub cookie: Option<String>,

    #[arg(
        short = 'r',
        long,
        help = "Referer header value (default: origin of the playlist URL)"
    )]
    pub referer: Option<String>,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    #[arg(
        short = 'f',
        long,
        help = "Discard segments staged by a previous run and download everything again"
    )]
    pub force: bool,

    /// Overall request timeout in seconds
    #[arg(
        long,
        default_value = "60",
        help = "Overall timeout in seconds for each HTTP request"
    )]
    pub timeout: u64,

    #[arg(
        long,
        default_value = "10",
        help = "Timeout in seconds for establishing a connection"
    )]
    pub connect_timeout: u64,

    #[arg(long, help = "User-Agent header value (default: a desktop browser string)")]
    pub user_agent: Option<String>,

    #[arg(long, help = "Do not follow HTTP redirects")]
    pub no_redirects: bool,

    /// Attempts per segment
    #[arg(
        long,
        default_value = "5",
        help = "Total download attempts per segment before it is given up"
    )]
    pub retries: u32,

    /// Show progress bars for operations
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "false",
        help = "Show a progress bar while downloading"
    )]
    pub show_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}
