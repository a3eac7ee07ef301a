fn main() -> anyhow::Result<()> {
    dental_bot_lib::run()
}
