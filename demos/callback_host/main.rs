use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use rxafs::addr::Host;
use rxafs::error::RpcError;
use rxafs::xdr::afsint::{CLIENT_CAPABILITY_ERRORTRANS, RXAFSCB_PORT};
use rxafs::{new_service_rxafscb, rx_init, CallbackDispatcher, CallbackHandler, Context, RxConfig};
use tracing::info;
use uuid::Uuid;

/// Hosts the RXAFSCB callback service so a file server can query this
/// process as a cache manager.
#[derive(Parser)]
#[command(name = "callback_host")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    listen: String,

    #[arg(short, long, default_value_t = RXAFSCB_PORT)]
    port: u16,

    /// Address to advertise in TellMeAboutYourself; repeatable
    #[arg(short, long = "address", default_value = "127.0.0.1")]
    addresses: Vec<Ipv4Addr>,

    /// UUID to report; a random one is generated when absent
    #[arg(long)]
    uuid: Option<Uuid>,
}

struct StaticIdentity {
    uuid: Uuid,
    addresses: Vec<Ipv4Addr>,
}

#[async_trait]
impl CallbackHandler for StaticIdentity {
    async fn get_uuid(&self, _context: &Context) -> Result<Uuid, RpcError> {
        Ok(self.uuid)
    }

    async fn get_local_addresses(&self, context: &Context) -> Result<Vec<Host>, RpcError> {
        info!("{} asked who we are", context.peer);
        Ok(self.addresses.iter().copied().map(Host::from).collect())
    }

    async fn get_capabilities(&self, _context: &Context) -> Result<Vec<u32>, RpcError> {
        Ok(vec![CLIENT_CAPABILITY_ERRORTRANS])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let identity = StaticIdentity {
        uuid: args.uuid.unwrap_or_else(Uuid::new_v4),
        addresses: args.addresses,
    };
    println!("Serving RXAFSCB on {}:{} as {}", args.listen, args.port, identity.uuid);

    let rx = rx_init(args.listen.as_str(), args.port, RxConfig::default()).await?;
    let dispatcher = Arc::new(CallbackDispatcher::new());
    dispatcher.bind(Arc::new(identity));
    let _service = new_service_rxafscb(&rx, dispatcher)?;

    let stopper = rx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.shutdown();
        }
    });
    rx.start_serving(true).await;
    Ok(())
}
