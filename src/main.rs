use anyhow::Result;

fn main() -> Result<()> {
    devhabit::run()?;
    Ok(())
}
