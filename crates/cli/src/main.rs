use std::process::ExitCode;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    bitrix_mcp_cli::run()
}
