mod job;

fn main() -> anyhow::Result<()> {
    job::run()
}
