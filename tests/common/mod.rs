#![allow(dead_code)]

use bytes::Bytes;
use gmonad::Request;

pub fn request(method: &str, path: &str, headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    Request::from_http(builder.body(Bytes::new()).unwrap()).unwrap()
}

pub fn header<'a>(res: &'a gmonad::Response, name: &str) -> Option<&'a str> {
    res.headers().get(name).map(|v| v.to_str().unwrap())
}

pub fn has_cors_headers(res: &gmonad::Response) -> bool {
    res.headers().keys().any(|k| k.as_str().starts_with("access-control-"))
}
