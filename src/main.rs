fn main() -> anyhow::Result<()> {
    memo_panel::cli::run()
}
