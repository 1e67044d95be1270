//! The kvs-client executable supports the following command line arguments:
//!
//! `kvs-client get <KEY> [--addr IP-PORT]`
//!
//!     Get the string value of a given string key.
//!     Prints "Key not found" if the key holds no value.
//!
//! `kvs-client put <KEY> <VALUE> [--addr IP-PORT]`
//!
//!     Set the value of a string key to a string.
//!
//! `kvs-client append <KEY> <VALUE> [--addr IP-PORT]`
//!
//!     Append a string to the value of a string key.
//!
//! --addr accepts an IP address, either v4 or v6, and a port number, with the format IP:PORT.
//! If --addr is not specified then connect on 127.0.0.1:4000.
//! An error and a non-zero exit code are returned if IP-PORT does not parse as an address, or if
//! the server answers "wrong leader".
//!
//! `kvs-client -V`
//!
//!     Print the version.

use std::net::SocketAddr;
use std::process::exit;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use kvraft::{KvsClient, KvsError, Result, Status};

const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";

#[derive(Debug)]
enum Cmd {
    Get { key: String },
    Put { key: String, value: String },
    Append { key: String, value: String },
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    cmd: Cmd,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT
    /// # Errors
    /// returns [`KvsError::Parsing`] if it is not
    fn build(addr: &str, cmd: Cmd) -> Result<Opt> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| KvsError::Parsing(format!("could not parse {} into an IP address and port", addr)))?;
        Ok(Opt { addr, cmd })
    }
}

fn main() {
    let key_arg = || Arg::with_name("KEY").required(true).index(1);
    let value_arg = || Arg::with_name("VALUE").required(true).index(2);
    let addr_arg = || Arg::with_name("addr")
        .long("addr")
        .value_name("IP_ADDR:PORT")
        .help("sets the IP_ADDR:PORT of the server to connect to")
        .default_value(DEFAULT_ADDRESS);

    let matches = App::new("kvs-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a client for the replicated key-value store")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommands(vec![
            SubCommand::with_name("get")
                .about("Get the string value of a given string key")
                .arg(key_arg())
                .arg(addr_arg()),
            SubCommand::with_name("put")
                .about("Set the value of a string key to a string")
                .arg(key_arg())
                .arg(value_arg())
                .arg(addr_arg()),
            SubCommand::with_name("append")
                .about("Append a string to the value of a string key")
                .arg(key_arg())
                .arg(value_arg())
                .arg(addr_arg()),
        ])
        .get_matches();

    if let Err(e) = parse_options(&matches).and_then(run) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// runs the requested command against the server in `opt`
fn run(opt: Opt) -> Result<()> {
    let mut client = KvsClient::connect(opt.addr)?;
    let status = match opt.cmd {
        Cmd::Get { key } => {
            let reply = client.get(key)?;
            match reply.status {
                Status::Ok => println!("{}", reply.value),
                Status::NoKey => println!("Key not found"),
                Status::WrongLeader => (),
            }
            reply.status
        }
        Cmd::Put { key, value } => client.put(key, value)?.status,
        Cmd::Append { key, value } => client.append(key, value)?.status,
    };

    if status == Status::WrongLeader {
        return Err(KvsError::StringErr(format!("{} is not the leader, try another replica", opt.addr)));
    }
    Ok(())
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let (name, args) = matches.subcommand();
    let args = args.ok_or_else(|| KvsError::Parsing("missing command".to_owned()))?;
    let addr = args.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
    let key = args.value_of("KEY").map(String::from).unwrap_or_default();
    let value = || args.value_of("VALUE").map(String::from).unwrap_or_default();

    let cmd = match name {
        "get" => Cmd::Get { key },
        "put" => Cmd::Put { key, value: value() },
        "append" => Cmd::Append { key, value: value() },
        other => return Err(KvsError::Parsing(format!("unknown command {}", other))),
    };
    Opt::build(addr, cmd)
}
