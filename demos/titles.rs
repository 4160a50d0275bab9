use eskit::Result;
use eskit::config::Config;
use eskit::es::Es;

fn main() -> Result<()> {
    let es = Es::open(&Config::from_env())?;

    for title_id in es.installed_titles()? {
        let tmd = es.installed_tmd(title_id)?;
        let stored = es.stored_contents(title_id)?;
        println!(
            "{title_id:016x} {} v{} ({}/{} contents)",
            tmd.game_id(),
            tmd.title_version,
            stored.len(),
            tmd.contents.len()
        );
    }
    println!("shared contents: {}", es.shared_contents()?.len());

    Ok(())
}
