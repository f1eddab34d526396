use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Opts {
    #[clap(subcommand)]
    pub cmd: SubCmd,

    #[clap(flatten)]
    pub opt: GlobalOpts,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Configuration file, defaults to ~/.judge-orchestrator/config.toml
    #[clap(long, short, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base url of the judge service
    #[clap(long, global = true, env = "JUDGE0_API_URL")]
    pub judge_url: Option<String>,

    /// API key for a hosted judge service
    #[clap(long, global = true, env = "RAPIDAPI_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API host for a hosted judge service
    #[clap(long, global = true, env = "RAPIDAPI_HOST")]
    pub api_host: Option<String>,

    /// Auth token for a self-hosted judge service
    #[clap(long, global = true, env = "JUDGE0_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCmd {
    /// Judge a source file against a stored problem
    #[clap(name = "submit")]
    Submit(SubmitSubCmd),

    /// Print a stored submission
    #[clap(name = "show")]
    Show(ShowSubCmd),
}

#[derive(Args, Debug, Clone)]
pub struct SubmitSubCmd {
    /// Id of the problem, read from `<dataDir>/problems/<id>.toml`
    #[clap(long, short)]
    pub problem: String,

    /// One of cpp, java, python, javascript
    #[clap(long, short)]
    pub language: String,

    /// Source file to judge
    #[clap(long, short, value_name = "PATH")]
    pub file: PathBuf,

    /// Author recorded on the submission
    #[clap(long, short, default_value = "cli")]
    pub author: String,
}

#[derive(Args, Debug, Clone)]
pub struct ShowSubCmd {
    /// Submission id
    pub id: String,
}
