use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lora_keyvault::cache::{CachedKeyService, CachedKeyVault};
use lora_keyvault::config::Config;
use lora_keyvault::cryptoservices::{
    ApplicationCryptoService, Device, MemoryCryptoService, NetworkCryptoService,
};
use lora_keyvault::envelope::{unwrap_aes128_key, wrap_aes128_key, KeyEnvelope};
use lora_keyvault::eui::{EuiBlock, EuiBlockStore, MemoryEuiBlockStore};
use lora_keyvault::kek_label::{as_kek_label, ns_kek_label};
use lora_keyvault::lorawan::ping::compute_ping_offset;
use lora_keyvault::lorawan::{AES128Key, DevAddr, DevNonce, JoinNonce, MacVersion, NetID, EUI64};
use lora_keyvault::service::{KeyService, VaultKeyService};
use lora_keyvault::vault::MemoryKeyVault;

type KeyServiceStack = CachedKeyService<VaultKeyService<CachedKeyVault<MemoryKeyVault>>>;

#[derive(Parser)]
#[command(name = "lora-keyvault")]
#[command(about = "LoRaWAN key derivation, wrapping and custody")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive network and application session keys after a join
    DeriveKeys {
        #[arg(long, default_value = "1.1")]
        lorawan_version: MacVersion,
        #[arg(long)]
        join_eui: EUI64,
        #[arg(long)]
        dev_eui: EUI64,
        #[arg(long)]
        join_nonce: JoinNonce,
        #[arg(long)]
        dev_nonce: DevNonce,
        #[arg(long, default_value = "000000")]
        net_id: NetID,
    },
    /// Wrap a 128-bit key under a KEK from the vault
    Wrap {
        #[arg(long)]
        kek: String,
        key: AES128Key,
    },
    /// Unwrap a JSON key envelope
    Unwrap { envelope: String },
    /// Print the KEK label of a network or application server
    KekLabel {
        role: Role,
        #[arg(long, default_value = "")]
        addr: String,
        #[arg(long)]
        net_id: Option<NetID>,
    },
    /// Compute the class B ping-slot offset
    PingOffset {
        #[arg(long)]
        beacon_time: u32,
        #[arg(long)]
        dev_addr: DevAddr,
        #[arg(long, default_value_t = 4096)]
        ping_period: u32,
    },
    /// Issue DevEUIs from the configured EUI block
    IssueDevEui {
        #[arg(long)]
        application: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Ns,
    As,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {:#}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("lora-keyvault v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::DeriveKeys {
            lorawan_version,
            join_eui,
            dev_eui,
            join_nonce,
            dev_nonce,
            net_id,
        } => {
            let keys = Arc::new(key_service(&config)?);
            let (network, application) = crypto_services(&config, keys)?;
            let dev = Device::new(join_eui, dev_eui);

            let nwk = network
                .derive_nwk_s_keys(&dev, lorawan_version, &join_nonce, &dev_nonce, &net_id)
                .await?;
            let app_s_key = application
                .derive_app_s_key(&dev, lorawan_version, &join_nonce, &dev_nonce, &net_id)
                .await?;

            println!("FNwkSIntKey: {}", hex::encode_upper(nwk.f_nwk_s_int_key.0));
            if lorawan_version.is_1_1() {
                println!("SNwkSIntKey: {}", hex::encode_upper(nwk.s_nwk_s_int_key.0));
                println!("NwkSEncKey:  {}", hex::encode_upper(nwk.nwk_s_enc_key.0));
            }
            println!("AppSKey:     {}", hex::encode_upper(app_s_key.0));
        }
        Command::Wrap { kek, key } => {
            let keys = key_service(&config)?;
            let envelope = wrap_aes128_key(&key, &kek, &keys).await?;
            println!("{}", serde_json::to_string(&envelope)?);
        }
        Command::Unwrap { envelope } => {
            let keys = key_service(&config)?;
            let envelope: KeyEnvelope =
                serde_json::from_str(&envelope).context("Invalid key envelope")?;
            let key = unwrap_aes128_key(&envelope, &keys).await?;
            println!("{}", hex::encode_upper(key.0));
        }
        Command::KekLabel { role, addr, net_id } => {
            let separator = &config.kek.separator;
            let label = match role {
                Role::Ns => ns_kek_label(net_id.as_ref(), &addr, separator)?,
                Role::As => as_kek_label(&addr, separator)?,
            };
            println!("{}", label);
        }
        Command::PingOffset {
            beacon_time,
            dev_addr,
            ping_period,
        } => {
            let offset = compute_ping_offset(beacon_time, &dev_addr, ping_period)?;
            println!("{}", offset);
        }
        Command::IssueDevEui { application, count } => {
            let Some(eui) = &config.eui else {
                bail!("No [eui] block configured");
            };
            let mut store = MemoryEuiBlockStore::new(EuiBlock::new(eui.prefix, eui.prefix_len)?);
            if let Some(limit) = eui.application_limit {
                store = store.with_application_limit(limit);
            }
            for _ in 0..count {
                println!("{}", store.issue_dev_eui(&application).await?);
            }
        }
    }

    Ok(())
}

/// Vault, vault cache, key service and unwrap cache from the configuration
fn key_service(config: &Config) -> anyhow::Result<KeyServiceStack> {
    let vault = config.build_key_vault()?;
    info!("Key vault loaded with {} entries", vault.len());

    let cache = &config.cache;
    let vault = CachedKeyVault::new(vault, cache.size, cache.ttl(), cache.certificate_ttl());
    Ok(CachedKeyService::new(
        VaultKeyService::new(vault),
        cache.size,
        cache.ttl(),
    ))
}

type CryptoServices = (
    Arc<dyn NetworkCryptoService>,
    Arc<dyn ApplicationCryptoService>,
);

fn crypto_services(
    config: &Config,
    keys: Arc<impl KeyService + 'static>,
) -> anyhow::Result<CryptoServices> {
    if let Some(url) = &config.crypto.remote_url {
        return remote_crypto_services(url, config.crypto.remote_retries, keys);
    }

    let service = Arc::new(MemoryCryptoService::new(
        config.crypto.nwk_key,
        config.crypto.app_key,
    ));
    info!("Using in-memory crypto service");
    let network: Arc<dyn NetworkCryptoService> = service.clone();
    let application: Arc<dyn ApplicationCryptoService> = service;
    Ok((network, application))
}

#[cfg(feature = "remote")]
fn remote_crypto_services(
    url: &str,
    retries: u32,
    keys: Arc<impl KeyService + 'static>,
) -> anyhow::Result<CryptoServices> {
    use lora_keyvault::cryptoservices::{HttpCryptoTransport, RemoteCryptoService};

    let transport = HttpCryptoTransport::new(url)?.with_retries(retries);
    let service = Arc::new(RemoteCryptoService::new(transport, keys));
    info!("Using remote crypto service at {}", url);
    let network: Arc<dyn NetworkCryptoService> = service.clone();
    let application: Arc<dyn ApplicationCryptoService> = service;
    Ok((network, application))
}

#[cfg(not(feature = "remote"))]
fn remote_crypto_services(
    url: &str,
    _retries: u32,
    _keys: Arc<impl KeyService + 'static>,
) -> anyhow::Result<CryptoServices> {
    bail!("Remote crypto service {} configured but the remote feature is disabled", url)
}
