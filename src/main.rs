fn main() -> anyhow::Result<()> {
    claimlens_lib::run()
}
