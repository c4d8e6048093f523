pub fn main() -> anyhow::Result<()> {
    launcher_cli::process_command()
}
