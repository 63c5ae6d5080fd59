// BitTrickle peer: `trickle-peer <tracker_port>`.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use trickle_linux::peer::{PeerClient, PeerSettings};
use trickle_linux::{config, shell};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let Some(port) =
        trickle_linux::parse_port_arg(std::env::args().skip(1), "trickle-peer <tracker_port>")?
    else {
        println!("trickle-peer {}", VERSION);
        return Ok(());
    };
    trickle_linux::init_tracing();
    let cfg = config::load();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let tracker = tokio::net::lookup_host((cfg.tracker_host.as_str(), port))
            .await?
            .next()
            .with_context(|| format!("could not resolve {}", cfg.tracker_host))?;
        let mut client = PeerClient::connect(tracker, PeerSettings::from(&cfg)).await?;
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut out = std::io::stdout();
        if !shell::login(&mut client, &mut input, &mut out).await? {
            return Ok(());
        }
        shell::run(client, &mut input, &mut out).await?;
        Ok::<(), anyhow::Error>(())
    })
}
