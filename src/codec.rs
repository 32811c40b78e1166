/// Index Value Codec
///
/// Values in the auxiliary index are CBOR-serialized and then
/// compressed with Zstandard. A pretrained dictionary can be supplied
/// at startup; the dictionary is prepared once and shared immutably
/// for the process lifetime. Raw 8-byte heights bypass this codec and
/// are stored as plain big-endian integers.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use zstd::dict::{DecoderDictionary, EncoderDictionary};

use crate::error::ArchiveError;

/// Default compression level. Index values are small and read-heavy,
/// so a fast level wins over ratio.
pub const DEFAULT_LEVEL: i32 = 3;

pub struct Codec {
    encoder_dict: Option<EncoderDictionary<'static>>,
    decoder_dict: Option<DecoderDictionary<'static>>,
    level: i32,
}

impl Codec {
    /// Codec without a dictionary. Values still compress, just
    /// without the pretrained tables.
    pub fn plain() -> Self {
        Self {
            encoder_dict: None,
            decoder_dict: None,
            level: DEFAULT_LEVEL,
        }
    }

    /// Codec with a pretrained dictionary. The dictionary bytes are
    /// copied into prepared encoder/decoder forms here so the hot
    /// path never re-parses them.
    pub fn with_dictionary(dict: &[u8], level: i32) -> Self {
        Self {
            encoder_dict: Some(EncoderDictionary::copy(dict, level)),
            decoder_dict: Some(DecoderDictionary::copy(dict)),
            level,
        }
    }

    /// CBOR-serialize and compress a value.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ArchiveError> {
        let cbor = serde_cbor::to_vec(value)?;
        self.compress(&cbor)
    }

    /// Decompress and CBOR-deserialize a value.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ArchiveError> {
        let cbor = self.decompress(data)?;
        Ok(serde_cbor::from_slice(&cbor)?)
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
        match &self.encoder_dict {
            Some(dict) => {
                let mut output = Vec::new();
                let mut encoder =
                    zstd::stream::Encoder::with_prepared_dictionary(&mut output, dict)
                        .map_err(|e| ArchiveError::Io(e.to_string()))?;
                encoder
                    .write_all(data)
                    .map_err(|e| ArchiveError::Io(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| ArchiveError::Io(e.to_string()))?;
                Ok(output)
            }
            None => zstd::encode_all(data, self.level).map_err(|e| ArchiveError::Io(e.to_string())),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
        match &self.decoder_dict {
            Some(dict) => {
                let mut output = Vec::new();
                let mut decoder = zstd::stream::Decoder::with_prepared_dictionary(data, dict)
                    .map_err(|e| ArchiveError::CorruptRecord(e.to_string()))?;
                decoder
                    .read_to_end(&mut output)
                    .map_err(|e| ArchiveError::CorruptRecord(e.to_string()))?;
                Ok(output)
            }
            None => {
                zstd::decode_all(data).map_err(|e| ArchiveError::CorruptRecord(e.to_string()))
            }
        }
    }
}
