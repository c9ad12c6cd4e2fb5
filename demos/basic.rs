use std::time::Duration;

use flag_resolver::{FlagEntry, FlagSet, Resolver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Flags served until the remote source answers, and again whenever
    // it becomes unreachable.
    let fallback = FlagSet::new(vec![
        FlagEntry::new("EnableBetaBanner", "false"),
        FlagEntry::new("ThemeColor", "green"),
    ]);

    let resolver = Resolver::builder()
        .with_url("https://featureflagdemo.blob.core.windows.net/flags/hosted-sample-flags.json")
        .with_fallback(fallback)
        .with_cache_timeout(Duration::from_secs(30))
        .build()?;

    // Reads are synchronous and never wait on the network.
    println!("ThemeColor = {:?}", resolver.get("ThemeColor"));

    // Give the first refresh a moment, then dump the whole set.
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("state: {:?}", resolver.state());
    for entry in resolver.current_flag_set().entries() {
        println!("  {} = {}", entry.name, entry.value);
    }

    resolver.shutdown();
    Ok(())
}
