//! BTC SNARK Relay - command line interface

use btc_snark_relay::{
    augment::augment_verifier,
    config::{Args, Command, Config},
    core::{
        assemble_witness, bits, concat_block_hashes248, concat_hash248, hash248, ByteOrder,
        CompactTarget, ConcatInput, DifficultyWindow, HeaderStore,
    },
    protocol::{
        rpc::parse_address, ContractArtifact, EthRpcClient, Proof, RelayClient, TxReceipt,
        VerificationKey,
    },
    utils::{logging::init_logging, logging::LogContext, TIME_FORMAT},
    Error, Result, APP_NAME, APP_VERSION,
};

use chrono::DateTime;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Decoded header as printed by `header`
#[derive(Debug, Serialize)]
struct HeaderReport {
    block_number: u64,
    hash: String,
    version: u32,
    hash_prev: String,
    merkle_root: String,
    timestamp: u32,
    time: Option<String>,
    nbits: CompactTarget,
    difficulty: f64,
    nonce: u32,
    hash248: String,
    raw: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args).await?;

    let _guard = init_logging(
        &config.logging.level,
        config.logging.format,
        config.logging.file.as_deref(),
    )?;

    debug!("{} v{}", APP_NAME, APP_VERSION);

    match args.command {
        Command::Header {
            block_number,
            json,
            bits: with_bits,
        } => print_header(&config, block_number, json, with_bits),
        Command::ConcatHash {
            block_numbers,
            input,
        } => print_concat_hash(&config, &block_numbers, input.unwrap_or(config.witness.input)),
        Command::Witness {
            last_verified_block,
            n_headers,
            zokrates,
            ..
        } => print_witness(&config, last_verified_block, n_headers, zokrates),
        Command::NextNbits {
            prev_block,
            prev_time,
            start_time,
            prev_nbits,
        } => print_next_nbits(&config, prev_block, prev_time, start_time, prev_nbits),
        Command::Difficulty { nbits } => {
            println!("nbits:      {}", nbits);
            println!("target:     {:064x}", nbits.target()?);
            println!("difficulty: {}", nbits.difficulty()?);
            Ok(())
        }
        Command::HexToBits { hex } => {
            let (text, vector) = bits::hex_to_bits(&hex)?;
            println!("{}", text);
            println!("[{}]", bits::bits_to_string(&vector, ", "));
            Ok(())
        }
        Command::ReadHash { file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let digest = bits::parse_circuit_output(&text)?;
            println!("natural: {}", ByteOrder::Natural.to_hex(digest));
            println!("swapped: {}", ByteOrder::Swapped.to_hex(digest));
            Ok(())
        }
        Command::Deploy { name, abi, bin } => deploy(&config, name, abi, bin).await,
        Command::StoreHeader {
            store,
            block_number,
            get_hash,
        } => store_header(&config, &store, block_number, get_hash).await,
        Command::Verify {
            verifier,
            last_verified_block,
            n_headers,
            proof,
            link_store,
            update_vk,
        } => {
            verify(
                &config,
                &verifier,
                last_verified_block,
                n_headers,
                proof,
                link_store,
                update_vk,
            )
            .await
        }
        Command::AugmentVerifier { input, output } => augment(&input, &output).await,
        Command::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<HeaderStore> {
    HeaderStore::open(&config.data.headers_file).map_err(|e| match e {
        Error::Io(io) => Error::config(format!(
            "Cannot read header log {}: {}",
            config.data.headers_file.display(),
            io
        )),
        other => other,
    })
}

fn header_report(store: &HeaderStore, block_number: i64) -> Result<HeaderReport> {
    let header = store.read_header(block_number)?;
    let hash = header.hash();
    let timestamp = header.timestamp_u32();

    Ok(HeaderReport {
        block_number: header.block_number,
        hash: ByteOrder::Swapped.to_hex(hash),
        version: header.version_u32(),
        hash_prev: ByteOrder::Swapped.to_hex(header.hash_prev),
        merkle_root: ByteOrder::Swapped.to_hex(header.merkle_root),
        timestamp,
        time: DateTime::from_timestamp(i64::from(timestamp), 0)
            .map(|t| t.format(TIME_FORMAT).to_string()),
        nbits: CompactTarget(header.nbits_u32()),
        difficulty: CompactTarget(header.nbits_u32()).difficulty()?,
        nonce: header.nonce_u32(),
        hash248: hash248(hash, ByteOrder::Natural).to_string(),
        raw: hex::encode(header.to_bytes()),
    })
}

fn print_header(config: &Config, block_number: i64, json: bool, with_bits: bool) -> Result<()> {
    let store = open_store(config)?;
    let report = header_report(&store, block_number)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("block:       {}", report.block_number);
        println!("hash:        {}", report.hash);
        println!("version:     {}", report.version);
        println!("prev hash:   {}", report.hash_prev);
        println!("merkle root: {}", report.merkle_root);
        match &report.time {
            Some(time) => println!("time:        {} ({})", report.timestamp, time),
            None => println!("time:        {}", report.timestamp),
        }
        println!("nbits:       {}", report.nbits);
        println!("difficulty:  {}", report.difficulty);
        println!("nonce:       {}", report.nonce);
        println!("hash248:     {}", report.hash248);
    }

    if with_bits {
        let raw = hex::decode(&report.raw).map_err(|e| Error::other(e.to_string()))?;
        println!("{}", bits::bits_to_string(&bits::bytes_to_bits(&raw), ""));
    }
    Ok(())
}

fn print_concat_hash(config: &Config, block_numbers: &[u64], input: ConcatInput) -> Result<()> {
    let store = open_store(config)?;
    let group = block_numbers
        .iter()
        .map(|&n| {
            let index = i64::try_from(n)
                .map_err(|_| Error::malformed_input(format!("Block number {} too large", n)))?;
            Ok(store.read_header(index)?.to_bytes())
        })
        .collect::<Result<Vec<_>>>()?;

    let hash = match input {
        ConcatInput::RawHeaders => concat_hash248(&group),
        ConcatInput::BlockHashes => concat_block_hashes248(&group),
    };
    println!("{}", hash);
    println!("0x{}", hex::encode(hash.to_bytes()));
    Ok(())
}

fn print_witness(
    config: &Config,
    last_verified_block: u64,
    n_headers: u64,
    zokrates: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let witness = assemble_witness(&store, last_verified_block, n_headers, &config.witness)?;

    if zokrates {
        println!("{}", witness.to_zokrates_args());
    } else {
        println!("{}", serde_json::to_string_pretty(&witness)?);
    }
    Ok(())
}

fn print_next_nbits(
    config: &Config,
    prev_block: u64,
    prev_time: Option<u32>,
    start_time: Option<u32>,
    prev_nbits: Option<CompactTarget>,
) -> Result<()> {
    let window = match (prev_time, start_time, prev_nbits) {
        (Some(prev_time), Some(start_time), Some(prev_nbits)) => DifficultyWindow {
            start_time,
            prev_time,
            prev_block_number: prev_block,
            prev_nbits: prev_nbits.0,
        },
        _ => {
            let mut window = DifficultyWindow::from_store(&open_store(config)?, prev_block)?;
            if let Some(prev_time) = prev_time {
                window.prev_time = prev_time;
            }
            if let Some(start_time) = start_time {
                window.start_time = start_time;
            }
            if let Some(prev_nbits) = prev_nbits {
                window.prev_nbits = prev_nbits.0;
            }
            window
        }
    };

    let retarget = window.retarget()?;
    if !retarget.adjusted {
        info!(prev_block, "Not a retarget boundary, target unchanged");
    }
    if retarget.clamped {
        warn!("Target capped at the proof-of-work limit");
    }
    println!("{}", CompactTarget(retarget.nbits));
    Ok(())
}

async fn relay_client(config: &Config, operation: &str) -> Result<RelayClient<EthRpcClient>> {
    let rpc = EthRpcClient::new(&config.rpc.url, config.rpc_timeout())?
        .with_retry(config.retry_policy());
    RelayClient::with_default_account(
        rpc,
        config.gas_params(),
        config.wait_options(),
        LogContext::for_operation(operation),
    )
    .await
}

fn print_receipt(what: &str, receipt: &TxReceipt) {
    println!(
        "{}: tx {} block {} gas {}",
        what,
        receipt.transaction_hash,
        receipt
            .block_number_u64()
            .map_or_else(|| "-".to_string(), |n| n.to_string()),
        receipt
            .gas_used_u64()
            .map_or_else(|| "-".to_string(), |n| n.to_string()),
    );
}

async fn deploy(
    config: &Config,
    name: Option<String>,
    abi: Option<PathBuf>,
    bin: Option<PathBuf>,
) -> Result<()> {
    let artifact = match (name, abi, bin) {
        (_, Some(abi), Some(bin)) => ContractArtifact::from_paths(abi, bin)?,
        (Some(name), _, _) => ContractArtifact::load(&config.data.contracts_dir, &name)?,
        _ => return Err(Error::config("Give a contract name or both --abi and --bin")),
    };

    let client = relay_client(config, "deploy").await?;
    let (address, receipt) = client.deploy(&artifact).await?;
    print_receipt(artifact.name(), &receipt);
    println!("{:?}", address);
    Ok(())
}

async fn store_header(
    config: &Config,
    store: &str,
    block_number: i64,
    get_hash: bool,
) -> Result<()> {
    let store_address = parse_address(store)?;
    let header = open_store(config)?.read_header(block_number)?;

    let client = relay_client(config, "store_header").await?;
    let receipt = client.store_block_header(store_address, &header).await?;
    print_receipt("store_block_header", &receipt);

    if get_hash {
        let receipt = client
            .get_header_hash(store_address, header.block_number)
            .await?;
        print_receipt("get_header_hash", &receipt);
    }
    Ok(())
}

async fn verify(
    config: &Config,
    verifier: &str,
    last_verified_block: u64,
    n_headers: u64,
    proof: Option<PathBuf>,
    link_store: Option<String>,
    update_vk: bool,
) -> Result<()> {
    let verifier = parse_address(verifier)?;
    let proof = Proof::load(proof.as_deref().unwrap_or(config.data.proof_file.as_path()))?;
    let witness = assemble_witness(
        &open_store(config)?,
        last_verified_block,
        n_headers,
        &config.witness,
    )?;

    let client = relay_client(config, "verify").await?;

    if let Some(store) = link_store {
        let receipt = client
            .link_verifier(verifier, parse_address(&store)?)
            .await?;
        print_receipt("set_header_contract_addr", &receipt);
    }

    if update_vk {
        let vk = VerificationKey::load(&config.data.verification_key_file)?;
        let receipts = client.update_verification_params(verifier, &vk).await?;
        for (i, receipt) in receipts.iter().enumerate() {
            print_receipt(&format!("IC[{}]", i), receipt);
        }
    }

    let receipt = client.verify_proof(verifier, &proof, &witness).await?;
    print_receipt("verifyTx", &receipt);
    Ok(())
}

async fn augment(input: &Path, output: &Path) -> Result<()> {
    let same = input == output
        || matches!(
            (input.canonicalize(), output.canonicalize()),
            (Ok(a), Ok(b)) if a == b
        );
    if same {
        return Err(Error::config("Input and output must be different files"));
    }

    let source = tokio::fs::read_to_string(input).await?;
    let augmented = augment_verifier(&source)?;
    tokio::fs::write(output, augmented).await?;
    info!("Wrote {}", output.display());
    Ok(())
}
