//! echo-kv client.
//!
//! This binary sends one command to a running echo-kv server and prints the
//! reply.

use bytes::BytesMut;
use clap::Parser;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use echo_kv::cli::Cli;
use echo_kv::resp::{self, RespValue};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let mut stream = match TcpStream::connect(&addr).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect to server at {}: {}", addr, e);
            eprintln!("Make sure the server is running with: cargo run --bin server");
            std::process::exit(1);
        }
    };

    let tokens = args.command.to_tokens();
    stream.write_all(&resp::encode(&tokens, false)).await?;

    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            eprintln!("Server closed the connection");
            std::process::exit(1);
        }
        match resp::decode_one(&buf) {
            Ok((value, _)) => {
                print_reply(&value);
                if let RespValue::Error(_) = value {
                    std::process::exit(1);
                }
                break;
            }
            Err(e) if e.is_incomplete() => continue,
            // Negative integers (`:-1`, `:-2`) are not decodable; show them raw.
            Err(_) => {
                println!("{}", String::from_utf8_lossy(&buf).trim_end());
                break;
            }
        }
    }

    Ok(())
}

fn print_reply(value: &RespValue) {
    match value {
        RespValue::Text(s) => println!("{}", s.trim_end_matches("\r\n")),
        RespValue::Integer(n) => println!("(integer) {}", n),
        RespValue::Error(msg) => eprintln!("(error) {}", msg),
        RespValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                print!("{}) ", i + 1);
                print_reply(item);
            }
        }
    }
}
