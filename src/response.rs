use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Error;
use crate::util::{parse_header_name, parse_header_value, truncate_body};

/// A parsed response: the last status block the transport reported plus the
/// body of the exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    reason_phrase: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    /// Parses raw status and header lines.
    ///
    /// A line starting with `HTTP/` (any case) starts a new block and discards
    /// everything collected so far, so only the final block counts. Other
    /// lines without a `:` are ignored.
    pub fn parse<L>(lines: &[L], body: Bytes) -> crate::Result<Self>
    where
        L: AsRef<str>,
    {
        let mut block: Vec<&str> = Vec::new();
        for line in lines {
            let line = line.as_ref().trim();
            if starts_with_http_version(line) {
                block.clear();
                block.push(line);
            } else if line.contains(':') {
                block.push(line);
            }
        }

        let Some((status_line, header_lines)) = block.split_first() else {
            return Err(Error::MalformedStatusLine {
                line: String::new(),
            });
        };
        let (status, reason_phrase) = parse_status_line(status_line)?;

        let headers = header_lines
            .iter()
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
            .collect();

        debug!(status = status.as_u16(), "parsed response");
        Ok(Self {
            status,
            reason_phrase,
            headers,
            body,
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Reason phrase from the status line. With [`crate::BlockingTransport`]
    /// this is the canonical phrase for the code, not the server's text.
    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    /// Headers in the order received, with their original name casing.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn header_map(&self) -> crate::Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            map.append(parse_header_name(name)?, parse_header_value(name, value)?);
        }
        Ok(map)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&self.body),
        })
    }
}

fn starts_with_http_version(line: &str) -> bool {
    line.get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("http/"))
}

fn parse_status_line(line: &str) -> crate::Result<(StatusCode, String)> {
    let malformed = || Error::MalformedStatusLine {
        line: line.to_owned(),
    };

    let mut tokens = line.splitn(3, ' ');
    let version = tokens.next().unwrap_or_default();
    let code = tokens.next().ok_or_else(malformed)?;
    if !starts_with_http_version(version) {
        return Err(malformed());
    }

    let code: u16 = code.parse().map_err(|_| malformed())?;
    if !(100..=599).contains(&code) {
        return Err(malformed());
    }
    let status = StatusCode::from_u16(code).map_err(|_| malformed())?;
    let reason = tokens.next().unwrap_or_default().to_owned();
    Ok((status, reason))
}
