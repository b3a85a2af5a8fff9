//! QST: a quest container that records the exact framed commands a server
//! would send to deliver a quest's `.bin`/`.dat` files, replayed offline
//! instead of over a socket.
//!
//! Command bodies here use a single, family-independent layout (a 16-byte
//! internal filename plus a trailing size field) rather than the several
//! per-family struct widths real clients use; this core only needs to
//! recover the two file payloads, not byte-exact client compatibility.

use crate::error::{CoreError, Result};
use crate::family::HeaderKind;
use crate::framing::decode_header;

const OPEN_FILE_OPCODE: u16 = 0x44;
const WRITE_FILE_OPCODE: u16 = 0x13;
const CHUNK_SIZE: usize = 0x400;
const FILENAME_SIZE: usize = 0x10;

struct OpenFileBody {
    filename: String,
    file_size: u32,
}

fn parse_open_file_body(body: &[u8]) -> Result<OpenFileBody> {
    if body.len() < FILENAME_SIZE + 4 {
        return Err(CoreError::codec("qst open-file command has incorrect size"));
    }
    let name_bytes = &body[0..FILENAME_SIZE];
    let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(FILENAME_SIZE);
    let filename = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
    let file_size = u32::from_le_bytes(body[FILENAME_SIZE..FILENAME_SIZE + 4].try_into().unwrap());
    Ok(OpenFileBody { filename, file_size })
}

struct WriteFileBody {
    filename: String,
    data: Vec<u8>,
}

fn parse_write_file_body(body: &[u8]) -> Result<WriteFileBody> {
    if body.len() < FILENAME_SIZE + CHUNK_SIZE + 4 {
        return Err(CoreError::codec("qst write-file command has incorrect size"));
    }
    let name_bytes = &body[0..FILENAME_SIZE];
    let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(FILENAME_SIZE);
    let filename = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
    let chunk = &body[FILENAME_SIZE..FILENAME_SIZE + CHUNK_SIZE];
    let data_size = u32::from_le_bytes(body[FILENAME_SIZE + CHUNK_SIZE..FILENAME_SIZE + CHUNK_SIZE + 4].try_into().unwrap()) as usize;
    if data_size > CHUNK_SIZE {
        return Err(CoreError::codec("qst contains invalid write command"));
    }
    Ok(WriteFileBody {
        filename,
        data: chunk[..data_size].to_vec(),
    })
}

/// Replays a recorded QST file's 0x44/0x13 command stream, recovering the
/// `.bin` and `.dat` payloads it carries.
pub fn decode_qst(data: &[u8], header_kind: HeaderKind) -> Result<(Vec<u8>, Vec<u8>)> {
    let header_size = header_kind.header_size();
    let alignment = header_size;

    let mut bin_contents = Vec::new();
    let mut dat_contents = Vec::new();
    let mut internal_bin_filename: Option<String> = None;
    let mut internal_dat_filename: Option<String> = None;
    let mut bin_file_size = 0u32;
    let mut dat_file_size = 0u32;

    let mut pos = 0usize;
    while pos < data.len() {
        let rem = pos % alignment;
        if rem != 0 {
            pos += alignment - rem;
        }
        if pos >= data.len() {
            break;
        }
        if pos + header_size > data.len() {
            break;
        }

        let (opcode, flag, size) = decode_header(header_kind, &data[pos..pos + header_size]);
        let size = size as usize;
        if pos + size > data.len() {
            return Err(CoreError::codec("qst command body extends beyond end of file"));
        }
        let body = &data[pos + header_size..pos + size];
        pos += size;

        match opcode {
            OPEN_FILE_OPCODE => {
                let cmd = parse_open_file_body(body)?;
                if cmd.filename.ends_with(".bin") {
                    if internal_bin_filename.is_some() {
                        return Err(CoreError::codec("qst contains multiple bin files"));
                    }
                    bin_file_size = cmd.file_size;
                    internal_bin_filename = Some(cmd.filename);
                } else if cmd.filename.ends_with(".dat") {
                    if internal_dat_filename.is_some() {
                        return Err(CoreError::codec("qst contains multiple dat files"));
                    }
                    dat_file_size = cmd.file_size;
                    internal_dat_filename = Some(cmd.filename);
                } else {
                    return Err(CoreError::codec("qst contains non-bin, non-dat file"));
                }
            }
            WRITE_FILE_OPCODE => {
                let cmd = parse_write_file_body(body)?;
                let dest = if Some(&cmd.filename) == internal_bin_filename.as_ref() {
                    &mut bin_contents
                } else if Some(&cmd.filename) == internal_dat_filename.as_ref() {
                    &mut dat_contents
                } else {
                    return Err(CoreError::codec("qst contains write command for non-open file"));
                };

                if dest.len() % CHUNK_SIZE != 0 {
                    return Err(CoreError::codec("qst contains uneven chunks out of order"));
                }
                if flag as usize != dest.len() / CHUNK_SIZE {
                    return Err(CoreError::codec("qst contains chunks out of order"));
                }
                dest.extend_from_slice(&cmd.data);
            }
            _ => return Err(CoreError::codec("invalid command in qst file")),
        }
    }

    if bin_contents.len() != bin_file_size as usize {
        return Err(CoreError::codec("bin file does not match expected size"));
    }
    if dat_contents.len() != dat_file_size as usize {
        return Err(CoreError::codec("dat file does not match expected size"));
    }

    Ok((bin_contents, dat_contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::encode_header;

    fn open_file_cmd(kind: HeaderKind, opcode: u16, filename: &str, file_size: u32) -> Vec<u8> {
        let mut body = vec![0u8; FILENAME_SIZE + 4];
        body[..filename.len()].copy_from_slice(filename.as_bytes());
        body[FILENAME_SIZE..].copy_from_slice(&file_size.to_le_bytes());
        let mut frame = encode_header(kind, opcode, 0, (kind.header_size() + body.len()) as u16);
        frame.extend_from_slice(&body);
        frame
    }

    fn write_file_cmd(kind: HeaderKind, filename: &str, chunk_index: u32, data: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; FILENAME_SIZE + CHUNK_SIZE + 4];
        body[..filename.len()].copy_from_slice(filename.as_bytes());
        body[FILENAME_SIZE..FILENAME_SIZE + data.len()].copy_from_slice(data);
        body[FILENAME_SIZE + CHUNK_SIZE..].copy_from_slice(&(data.len() as u32).to_le_bytes());
        let mut frame = encode_header(kind, WRITE_FILE_OPCODE, chunk_index, (kind.header_size() + body.len()) as u16);
        frame.extend_from_slice(&body);
        frame
    }

    #[test]
    fn decodes_single_chunk_bin_and_dat() {
        let kind = HeaderKind::DcGcXb;
        let bin_data = vec![0xAAu8; 100];
        let dat_data = vec![0xBBu8; 50];

        let mut qst = Vec::new();
        qst.extend(open_file_cmd(kind, OPEN_FILE_OPCODE, "quest.bin", bin_data.len() as u32));
        qst.extend(write_file_cmd(kind, "quest.bin", 0, &bin_data));
        qst.extend(open_file_cmd(kind, OPEN_FILE_OPCODE, "quest.dat", dat_data.len() as u32));
        qst.extend(write_file_cmd(kind, "quest.dat", 0, &dat_data));

        let (bin, dat) = decode_qst(&qst, kind).unwrap();
        assert_eq!(bin, bin_data);
        assert_eq!(dat, dat_data);
    }

    #[test]
    fn rejects_out_of_order_chunks() {
        let kind = HeaderKind::DcGcXb;
        let data = vec![0xAAu8; 10];

        let mut qst = Vec::new();
        qst.extend(open_file_cmd(kind, OPEN_FILE_OPCODE, "quest.bin", 10));
        qst.extend(write_file_cmd(kind, "quest.bin", 1, &data));

        assert!(decode_qst(&qst, kind).is_err());
    }
}
