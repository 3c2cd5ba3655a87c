//! Upload CLI
//!
//! Sends one file as `multipart/form-data` and prints the parsed response.

use clap::{Arg, ArgAction, Command};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use upload_transport::{
    ExtraFields, FieldScalar, FieldValue, HttpTransport, Method, Payload, TransportConfig,
    UploadRequestOptions, Uploader,
};

fn parse_header(raw: &str) -> Result<(String, Option<String>), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header '{}' must look like 'Name: value'", raw))?;
    let value = value.trim();
    Ok((
        name.trim().to_string(),
        (!value.is_empty()).then(|| value.to_string()),
    ))
}

/// Repeated `--data` keys become list fields
fn collect_fields<'a>(raw: impl Iterator<Item = &'a String>) -> Result<ExtraFields, String> {
    let mut pairs: Vec<(String, Vec<String>)> = Vec::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| format!("field '{}' must look like 'key=value'", item))?;
        match pairs.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, values)) => values.push(value.to_string()),
            None => pairs.push((key.to_string(), vec![value.to_string()])),
        }
    }

    let mut fields = ExtraFields::new();
    for (key, mut values) in pairs {
        if values.len() == 1 {
            fields.insert(key, values.remove(0));
        } else {
            fields.insert(
                key,
                FieldValue::List(values.into_iter().map(FieldScalar::Text).collect()),
            );
        }
    }
    Ok(fields)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("upload")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Upload a file as multipart/form-data")
        .arg(Arg::new("url").help("Target URL").required(true))
        .arg(Arg::new("file").help("File to upload").required(true))
        .arg(
            Arg::new("field")
                .long("field")
                .default_value("file")
                .help("Form field name for the file"),
        )
        .arg(
            Arg::new("method")
                .short('X')
                .long("method")
                .default_value("POST")
                .help("POST, PUT or PATCH"),
        )
        .arg(
            Arg::new("header")
                .short('H')
                .long("header")
                .action(ArgAction::Append)
                .help("Extra header 'Name: value'; an empty value suppresses the header"),
        )
        .arg(
            Arg::new("data")
                .short('d')
                .long("data")
                .action(ArgAction::Append)
                .help("Extra form field 'key=value'; repeat a key to send a list"),
        )
        .arg(
            Arg::new("with-credentials")
                .long("with-credentials")
                .action(ArgAction::SetTrue)
                .help("Send cookies and the configured bearer token"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON transport configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose output"),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match matches.get_one::<String>("config") {
        Some(path) => TransportConfig::from_json_file(path)?,
        None => TransportConfig::new(),
    };

    let url = matches.get_one::<String>("url").ok_or("missing url")?;
    let file = matches.get_one::<String>("file").ok_or("missing file")?;
    let field = matches.get_one::<String>("field").ok_or("missing field")?;
    let method: Method = matches
        .get_one::<String>("method")
        .ok_or("missing method")?
        .parse()?;

    let mut options = UploadRequestOptions::new(url.as_str(), Payload::from_path(file)?)
        .field_name(field.as_str())
        .method(method)
        .with_credentials(matches.get_flag("with-credentials"));

    if let Some(headers) = matches.get_many::<String>("header") {
        for raw in headers {
            options = match parse_header(raw)? {
                (name, Some(value)) => options.header(name, value),
                (name, None) => options.omit_header(name),
            };
        }
    }
    if let Some(data) = matches.get_many::<String>("data") {
        options = options.extra_fields(collect_fields(data)?);
    }
    options.validate()?;

    let last_percent = Arc::new(AtomicU64::new(u64::MAX));
    let options = options.on_progress(move |progress| match progress.percent {
        Some(percent) => {
            let whole = percent as u64;
            if last_percent.swap(whole, Ordering::SeqCst) != whole {
                eprintln!(
                    "Upload progress: {} ({}%)",
                    bytesize::ByteSize(progress.bytes_loaded),
                    whole
                );
            }
        }
        None => eprintln!(
            "Upload progress: {}",
            bytesize::ByteSize(progress.bytes_loaded)
        ),
    });

    let uploader = Uploader::new(HttpTransport::new(config)?)?;
    match uploader.upload(options).await {
        Ok((body, response)) => {
            eprintln!("HTTP {}", response.status);
            println!("{}", body);
            Ok(())
        }
        Err((error, body)) => {
            eprintln!("Upload failed: {}", error);
            if let Some(body) = body {
                eprintln!("{}", body);
            }
            std::process::exit(1);
        }
    }
}
