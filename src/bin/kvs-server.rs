//! this binary starts a single kv replica and serves it over TCP
//! to see the list of options, type: `kvs-server --help`

use std::env::current_dir;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;

use clap::{arg_enum, crate_version, value_t, App, Arg};
use crossbeam::channel;
use kvraft::raft::persister::FilePersister;
use kvraft::thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
use kvraft::{Config, KvService, KvsError, KvsServer, LocalRaft, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        shared,
        rayon
    }
}

const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";
const DEFAULT_POOL: Pool = Pool::shared;

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: SocketAddr,
    dir: PathBuf,
    config: Config,
    pool: Pool,
    threads: u32,
}

impl Opt {
    /// validates the raw command line values
    /// # Errors
    /// returns [`KvsError::Parsing`] if one of the parameters is invalid
    fn build(addr: &str, dir: Option<&str>, max_raft_state: &str, pool: Pool, threads: &str) -> Result<Opt> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| KvsError::Parsing(format!("could not parse {} into an IP address and port", addr)))?;
        let dir = match dir {
            Some(dir) => PathBuf::from(dir),
            None => current_dir()?,
        };
        let max_raft_state: i64 = max_raft_state
            .parse()
            .map_err(|_| KvsError::Parsing(format!("invalid snapshot threshold: {}", max_raft_state)))?;
        let threads: u32 = threads
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| KvsError::Parsing(format!("invalid thread count: {}", threads)))?;

        Ok(Opt { addr, dir, config: Config::with_max_raft_state(max_raft_state)?, pool, threads })
    }
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    let matches = App::new("kvs-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a replicated, linearizable key-value store")
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT that the server listens on")
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("dir")
            .long("dir")
            .value_name("PATH")
            .help("directory holding the log and snapshots, defaults to the current directory"))
        .arg(Arg::with_name("max-raft-state")
            .long("max-raft-state")
            .value_name("BYTES")
            .allow_hyphen_values(true)
            .help("snapshot once the log grows past this many bytes, -1 disables snapshots")
            .default_value("-1"))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .help("the thread pool serving connections, either 'shared' or 'rayon'")
            .default_value("shared"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .value_name("N")
            .help("number of threads serving connections")
            .default_value("8"))
        .get_matches();

    let pool = value_t!(matches, "pool", Pool).ok().unwrap_or(DEFAULT_POOL);
    let opt = Opt::build(
        matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS),
        matches.value_of("dir"),
        matches.value_of("max-raft-state").unwrap_or("-1"),
        pool,
        matches.value_of("threads").unwrap_or("8"),
    );
    let opt = match opt {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("kvs-server {}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", opt.dir);
    info!("Snapshot threshold: {:?}", opt.config.max_raft_state);
    info!("Listening on {}", opt.addr);

    let (tx, rx) = channel::unbounded();
    let raft = LocalRaft::new(FilePersister::open(&opt.dir)?, tx)?;
    let service = KvService::new(raft, rx, 0, opt.config)?;

    match opt.pool {
        Pool::shared => KvsServer::new(service, SharedQueueThreadPool::new(opt.threads)?).run(opt.addr),
        Pool::rayon => KvsServer::new(service, RayonThreadPool::new(opt.threads)?).run(opt.addr),
    }
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not install the tracing subscriber: {}", e);
    }
}
