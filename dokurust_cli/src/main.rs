//! Command line DokuWiki page editor.
//!
//! Fetches, replaces, or locks one wiki page over XML-RPC, prompting for
//! credentials unless told not to.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::process;

use anyhow::{Context, Result};
use dokurust::{ClientOptions, DokuWiki};
use log::debug;

const USAGE: &str =
    "Usage: dokurust [--nologin] [--noverify] <url> <page> <get|put|lock> [output_file] [input_file]";

#[derive(Debug, PartialEq)]
enum Action {
    Get,
    Put,
    Lock,
}

#[derive(Debug, PartialEq)]
struct Args {
    url: String,
    page: String,
    action: Action,
    nologin: bool,
    noverify: bool,
    output_file: Option<String>,
    input_file: Option<String>,
}

impl Args {
    fn parse(raw: Vec<String>) -> Result<Args, String> {
        let mut nologin = false;
        let mut noverify = false;
        let mut positional = Vec::new();
        for arg in raw {
            match arg.as_str() {
                "--nologin" => nologin = true,
                "--noverify" => noverify = true,
                _ if arg.starts_with('-') => return Err(format!("unrecognized flag `{}`", arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let (url, page, action) = match (positional.next(), positional.next(), positional.next()) {
            (Some(url), Some(page), Some(action)) => (url, page, action),
            _ => return Err("expected <url> <page> <action>".to_owned()),
        };
        let action = match action.as_str() {
            "get" => Action::Get,
            "put" => Action::Put,
            "lock" => Action::Lock,
            other => return Err(format!("undefined action `{}`", other)),
        };
        // An empty path means the default stream, same as omitting it
        let output_file = positional.next().filter(|path| !path.is_empty());
        let input_file = positional.next().filter(|path| !path.is_empty());
        if positional.next().is_some() {
            return Err("too many arguments".to_owned());
        }

        Ok(Args {
            url,
            page,
            action,
            nologin,
            noverify,
            output_file,
            input_file,
        })
    }
}

fn main() {
    env_logger::init();
    let raw: Vec<String> = env::args().skip(1).collect();
    if raw.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", USAGE);
        return;
    }
    let args = match Args::parse(raw) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("dokurust: {}", message);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };
    match run(&args) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("dokurust: {:#}", err);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<i32> {
    let options = ClientOptions {
        verify_tls: !args.noverify,
        ..ClientOptions::default()
    };
    let wiki = DokuWiki::connect(&args.url, options)
        .with_context(|| format!("failed to reach wiki at {}", args.url))?;
    debug!("wiki reports version {}", wiki.version());

    if !args.nologin {
        let username = prompt("username > ").context("failed to read username")?;
        let password =
            rpassword::prompt_password("password > ").context("failed to read password")?;
        if !wiki.login(&username, &password)? {
            println!("could not log in");
            return Ok(1);
        }
        println!("logged in OK.");
    }

    match args.action {
        Action::Get => {
            let text = wiki.get_page(&args.page)?;
            write_output(args.output_file.as_deref(), &text)?;
        }
        Action::Put => {
            let text = read_input(args.input_file.as_deref())?;
            wiki.put_page(&args.page, &text)?;
        }
        Action::Lock => {
            if wiki.lock(&args.page)? {
                println!("OK");
            } else {
                println!("can't lock page {}", args.page);
            }
        }
    }
    Ok(0)
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line
        .trim_end_matches(|ch| ch == '\r' || ch == '\n')
        .to_owned())
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))
        }
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn write_output(path: Option<&str>, text: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, text).with_context(|| format!("failed to write {}", path)),
        None => {
            io::stdout()
                .write_all(text.as_bytes())
                .context("failed to write stdout")?;
            Ok(())
        }
    }
}
