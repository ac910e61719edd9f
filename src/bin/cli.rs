//! Tokencom command line interface.

use std::process;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*,
    Arg, ArgMatches, SubCommand,
};
use console::style;
use log::{debug, trace, LevelFilter};
use simplelog::*;

use tokencom::{
    self as tc,
    provision::{self, Request},
    SerialTransport,
};

fn main() {
    println!("[TC] tokencom v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(1);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Tokencom talks to a hardware security token over its serial \
            port. When the token only runs its firmware, tokencom first loads \
            the management app given with `--app`, optionally with a User \
            Supplied Secret (USS). The management app then installs, deletes \
            or registers apps as requested.\n\
            \n\
            When the token already runs an app, no app can be loaded and any \
            USS is ignored. Unplug the token and plug it in again to get back \
            to firmware mode.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .setting(SubcommandRequiredElseHelp)
        .setting(VersionlessSubcommands)
        .arg(
            Arg::with_name("PORT")
                .help("the serial port of the token")
                .long_help(
                    "the serial port of the token; when not set, `tokencom` \
                     looks for a token on the USB bus and asks which one to \
                     use if there are several.",
                )
                .long("--port")
                .value_name("PATH")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("SPEED")
                .help("serial port speed in bits per second [default: 62500]")
                .long("--speed")
                .value_name("BPS")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("USS")
                .help("enter a phrase to derive the USS of the management app from")
                .long("--uss")
                .global(true),
        )
        .arg(
            Arg::with_name("USS_FILE")
                .help("derive the USS of the management app from a file, `-` for stdin")
                .long_help(
                    "derive the USS of the management app from the whole \
                     content of a file, `-` for stdin; takes precedence over \
                     `--uss`.",
                )
                .long("--uss-file")
                .value_name("FILE")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("APP")
                .help("the management app image, loaded when the token is in firmware mode")
                .long("--app")
                .value_name("PATH")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("NO_VERIFY")
                .help("do not compare the digest reported after an install with the image")
                .long("--no-verify")
                .global(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .long("--verbose")
                .multiple(true)
                .global(true)
                .help(
                    "Sets the logging level of verbosity, repeat several times for \
                     higher verbosity",
                ),
        )
        .subcommand(
            SubCommand::with_name("start")
                .about("start the app preloaded in flash (firmware mode)"),
        )
        .subcommand(
            SubCommand::with_name("install")
                .about("install an app through the management app")
                .arg(
                    Arg::with_name("FILE")
                        .help("path to the app image")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("OVERWRITE")
                        .help("delete the installed app first")
                        .long("--overwrite"),
                )
                .arg(
                    Arg::with_name("APP_USS")
                        .help("enter a phrase to derive the USS of the installed app from")
                        .long("--app-uss"),
                )
                .arg(
                    Arg::with_name("APP_USS_FILE")
                        .help("derive the USS of the installed app from a file, `-` for stdin")
                        .long("--app-uss-file")
                        .value_name("FILE")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("delete").about("delete the installed app"))
        .subcommand(
            SubCommand::with_name("register")
                .about("register the running app as the management app")
                .arg(
                    Arg::with_name("UNREGISTER")
                        .help("unregister it instead")
                        .long("--unregister"),
                ),
        )
        .subcommand(
            SubCommand::with_name("load-flash")
                .about("have the management app load the app in flash"),
        )
        .get_matches();

    let (name, sub) = matches.subcommand();
    let sub = sub.unwrap_or(&matches);

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'tokencom -v -v -v' or 'tokencom -vvv' vs 'tokencom -v'
    let verbosity = matches.occurrences_of("v").max(sub.occurrences_of("v"));
    let log_level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    // Shared arguments ========================================================

    let mut builder = tc::SettingsBuilder::default()
        .verbose(verbosity > 0)
        .verify_digest(!flag(&matches, sub, "NO_VERIFY"))
        .enter_uss(flag(&matches, sub, "USS"));

    if let Some(speed) = value(&matches, sub, "SPEED") {
        let baud_rate = value_t!(sub, "SPEED", u32)
            .or_else(|_| value_t!(matches, "SPEED", u32))
            .unwrap_or_else(|_| {
                println!(
                    "{}: `{}` needs to be a numeric value",
                    style("error").red(),
                    style("speed").cyan()
                );
                println!(
                    "   {} `{}` is not a valid value",
                    style("-->").cyan(),
                    style(speed).on_red()
                );
                process::exit(-1);
            });
        builder = builder.baud_rate(baud_rate);
    }
    if let Some(port) = value(&matches, sub, "PORT") {
        builder = builder.path(port);
    }
    if let Some(uss_file) = value(&matches, sub, "USS_FILE") {
        builder = builder.uss_file(uss_file);
    }
    if let Some(app) = value(&matches, sub, "APP") {
        builder = builder.mgmt_app(app);
    }
    let settings = builder.finalize();

    // The request =============================================================

    let request = match name {
        "start" => Request::Start,
        "install" => Request::Install {
            // Required by clap.
            image: sub.value_of("FILE").unwrap_or_default().to_owned(),
            overwrite: sub.is_present("OVERWRITE"),
            enter_uss: sub.is_present("APP_USS"),
            uss_file: sub.value_of("APP_USS_FILE").map(String::from),
        },
        "delete" => Request::Delete,
        "register" => Request::Register {
            unregister: sub.is_present("UNREGISTER"),
        },
        "load-flash" => Request::LoadFlash,
        _ => unreachable!(),
    };
    debug!("request: {:?}", request);

    // Run the state machine ===================================================

    let mut provisioner = provision::factory::<SerialTransport>(settings, request);
    let exit_code = provisioner.run();
    debug!("exit code: {}", exit_code);
    std::process::exit(exit_code.into());
}

/// Global arguments may be given before or after the subcommand.
fn value<'a>(matches: &'a ArgMatches, sub: &'a ArgMatches, name: &str) -> Option<&'a str> {
    sub.value_of(name).or_else(|| matches.value_of(name))
}

fn flag(matches: &ArgMatches, sub: &ArgMatches, name: &str) -> bool {
    sub.is_present(name) || matches.is_present(name)
}
