use self::message::{Request, Response};
use std::io::{self, Result as IoResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, trace};

pub mod handler;
pub mod message;

/// Longest command line accepted from a poller, terminator included.
pub const MAX_LINE_LENGTH: u64 = 4096;

pub struct Protocol;

impl Protocol {
    /// Reads one request line. `None` means the peer closed the stream.
    pub async fn read_request<R>(reader: &mut R) -> IoResult<Option<Request>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();
        let read = reader
            .take(MAX_LINE_LENGTH)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') && read as u64 == MAX_LINE_LENGTH {
            error!("Request line exceeds {} bytes. Closing session.", MAX_LINE_LENGTH);
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request line too long",
            ));
        }

        let text = String::from_utf8_lossy(&line);
        let request = Request::parse(text.trim_end_matches(['\r', '\n']));
        trace!("Received request: `{}`", request);
        Ok(Some(request))
    }

    /// Writes a whole answer and flushes it.
    pub async fn send_response<W>(writer: &mut W, response: Response) -> IoResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        trace!("Sending response ({} bytes)", response.len());
        writer.write_all(&response.freeze()).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod async_tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_lines_until_eof() {
        let input: &[u8] = b"list\r\nfetch if1sec\nquit";
        let mut reader = BufReader::new(input);

        assert_eq!(
            Protocol::read_request(&mut reader).await.unwrap(),
            Some(Request::List(None))
        );
        assert_eq!(
            Protocol::read_request(&mut reader).await.unwrap(),
            Some(Request::Fetch("if1sec".to_string()))
        );
        assert_eq!(
            Protocol::read_request(&mut reader).await.unwrap(),
            Some(Request::Quit)
        );
        assert_eq!(Protocol::read_request(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_overlong_lines() {
        let input = vec![b'a'; MAX_LINE_LENGTH as usize + 10];
        let mut reader = BufReader::new(&input[..]);

        let err = Protocol::read_request(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
