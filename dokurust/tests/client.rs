//! Exercises the client against a local single-purpose HTTP responder.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use dokurust::xmlrpc::{Client, Error, TransportError, Value};

/// Serves one canned HTTP response per connection on an ephemeral port and
/// captures each raw request for assertions.
fn serve(responses: Vec<String>) -> (String, mpsc::Receiver<String>, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let (sender, receiver) = mpsc::channel();
    let handle = thread::spawn(move || {
        for response in responses {
            let (stream, _) = listener.accept().unwrap();
            let request = answer(stream, &response);
            sender.send(request).unwrap();
        }
    });
    (url, receiver, handle)
}

fn answer(mut stream: TcpStream, response: &str) -> String {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request = String::new();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if let Some(value) = header_value(&line, "content-length") {
            content_length = value.parse().unwrap();
        }
        let blank = line == "\r\n" || line == "\n";
        request.push_str(&line);
        if blank {
            break;
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();
    request.push_str(std::str::from_utf8(&body).unwrap());
    stream.write_all(response.as_bytes()).unwrap();
    stream.flush().unwrap();
    request
}

fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let mut parts = line.splitn(2, ':');
    let key = parts.next()?;
    let value = parts.next()?;
    if key.eq_ignore_ascii_case(name) {
        Some(value.trim())
    } else {
        None
    }
}

fn http_response(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status_line,
        body.len(),
        extra_headers,
        body
    )
}

const HELLO_RESPONSE: &str = concat!(
    r#"<?xml version="1.0" encoding="utf8"?>"#,
    "<methodResponse><params>",
    "<param><string>hello world</string></param>",
    "</params></methodResponse>",
);

#[test]
fn call_decodes_params() {
    let (url, requests, server) = serve(vec![http_response("200 OK", "", HELLO_RESPONSE)]);
    let client = Client::new(&url).unwrap();

    let values = client.call("helloWorld", Vec::new()).unwrap();
    assert_eq!(vec![Value::from("hello world")], values);

    let request = requests.recv().unwrap().to_lowercase();
    assert!(request.contains("content-type: text/xml"));
    assert!(request.contains("<methodname>helloworld</methodname>"));
    // Zero parameters means no params element at all
    assert!(!request.contains("<params>"));
    server.join().unwrap();
}

#[test]
fn call_sends_encoded_parameters() {
    let (url, requests, server) = serve(vec![http_response("200 OK", "", HELLO_RESPONSE)]);
    let client = Client::new(&url).unwrap();

    client
        .call("wiki.putPage", vec![Value::from("start"), Value::from("text")])
        .unwrap();

    let request = requests.recv().unwrap();
    assert!(request.contains(concat!(
        "<params>",
        "<param><string><![CDATA[start]]></string></param>",
        "<param><string><![CDATA[text]]></string></param>",
        "</params>",
    )));
    server.join().unwrap();
}

#[test]
fn cookies_carry_across_calls() {
    let (url, requests, server) = serve(vec![
        http_response(
            "200 OK",
            "Set-Cookie: DokuWikisession=abc123; path=/; HttpOnly\r\n",
            HELLO_RESPONSE,
        ),
        http_response("200 OK", "", HELLO_RESPONSE),
    ]);
    let client = Client::new(&url).unwrap();

    client.call("dokuwiki.login", Vec::new()).unwrap();
    client.call("wiki.getPage", Vec::new()).unwrap();

    let first = requests.recv().unwrap().to_lowercase();
    assert!(!first.contains("cookie:"));
    let second = requests.recv().unwrap().to_lowercase();
    assert!(second.contains("cookie: dokuwikisession=abc123"));
    server.join().unwrap();
}

#[test]
fn bad_status_is_a_transport_error() {
    let (url, requests, server) = serve(vec![http_response(
        "500 Internal Server Error",
        "",
        "cats",
    )]);
    let client = Client::new(&url).unwrap();

    // The body is not XML; a transport error proves no parse was attempted
    match client.call("helloWorld", Vec::new()) {
        Err(Error::Transport(TransportError::Status { status, body })) => {
            assert_eq!(500, status);
            assert_eq!("cats", body);
        }
        other => panic!("expected a status error, got {:?}", other),
    }
    requests.recv().unwrap();
    server.join().unwrap();
}

#[test]
fn fault_becomes_a_fault_error() {
    let fault_body = concat!(
        r#"<?xml version="1.0" encoding="utf8"?>"#,
        "<methodResponse><fault><value><struct>",
        "<member><name>faultCode</name><value><int>4</int></value></member>",
        "<member><name>faultString</name>",
        "<value><string>Too many parameters</string></value></member>",
        "</struct></value></fault></methodResponse>",
    );
    let (url, requests, server) = serve(vec![http_response("200 OK", "", fault_body)]);
    let client = Client::new(&url).unwrap();

    match client.call("wiki.getPage", vec![Value::from("start")]) {
        Err(Error::Fault(fault)) => {
            assert_eq!(4, fault.code);
            assert_eq!("Too many parameters", fault.message);
            assert_eq!("wiki.getPage", fault.method);
            assert!(fault.request_xml.contains("<methodName>wiki.getPage</methodName>"));
        }
        other => panic!("expected a fault, got {:?}", other),
    }
    requests.recv().unwrap();
    server.join().unwrap();
}

#[test]
fn malformed_response_is_a_structural_error() {
    let (url, requests, server) = serve(vec![http_response(
        "200 OK",
        "",
        "<methodResponse></methodResponse>",
    )]);
    let client = Client::new(&url).unwrap();

    match client.call("helloWorld", Vec::new()) {
        Err(Error::Structural(err)) => {
            // The raw body rides along for diagnosis
            assert!(err.to_string().contains("<methodResponse></methodResponse>"));
        }
        other => panic!("expected a structural error, got {:?}", other),
    }
    requests.recv().unwrap();
    server.join().unwrap();
}
