use crate::error::Error;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(Error::DigestConfig(format!(
                "unknown hash algorithm `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashEncoding {
    #[default]
    Hex,
    Base64,
}

impl FromStr for HashEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            other => Err(Error::DigestConfig(format!(
                "unknown hash encoding `{other}`"
            ))),
        }
    }
}

type SaltCallback = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Hashes the *input* password for comparison against the backend's
/// already-hashed stored value; it never works the other way around. With
/// no algorithm configured the plaintext is compared directly. Optional
/// pre/post-digest callbacks cover salting schemes where material is
/// prepended before hashing or mixed into the encoded result.
#[derive(Default)]
pub struct PasswordDigest {
    algorithm: Option<HashAlgorithm>,
    encoding: HashEncoding,
    ignore_case: bool,
    pre_digest: Option<SaltCallback>,
    post_digest: Option<SaltCallback>,
}

impl PasswordDigest {
    /// Plaintext comparison, exact case.
    pub fn plaintext() -> Self {
        Self::default()
    }

    pub fn new(algorithm: HashAlgorithm, encoding: HashEncoding) -> Self {
        Self {
            algorithm: Some(algorithm),
            encoding,
            ..Self::default()
        }
    }

    /// Build from module options (`hash_algorithm`, `hash_encoding`,
    /// `ignore_password_case`). No algorithm option means plaintext.
    pub fn from_spec(spec: &config::ModuleSpec) -> Result<Self, Error> {
        let algorithm = spec
            .get("hash_algorithm")
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("none"))
            .map(HashAlgorithm::from_str)
            .transpose()?;
        let encoding = spec
            .get("hash_encoding")
            .map(HashEncoding::from_str)
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            algorithm,
            encoding,
            ignore_case: spec.flag("ignore_password_case"),
            pre_digest: None,
            post_digest: None,
        })
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn with_pre_digest(mut self, callback: SaltCallback) -> Self {
        self.pre_digest = Some(callback);
        self
    }

    pub fn with_post_digest(mut self, callback: SaltCallback) -> Self {
        self.post_digest = Some(callback);
        self
    }

    /// Digest and encode an input password.
    pub fn digest(&self, password: &str) -> String {
        let input = match &self.pre_digest {
            Some(callback) => callback(password),
            None => password.to_string(),
        };

        let encoded = match self.algorithm {
            None => input,
            Some(algorithm) => {
                let bytes = hash_bytes(algorithm, input.as_bytes());
                match self.encoding {
                    HashEncoding::Hex => hex::encode(bytes),
                    HashEncoding::Base64 => BASE64.encode(bytes),
                }
            }
        };

        match &self.post_digest {
            Some(callback) => callback(&encoded),
            None => encoded,
        }
    }

    /// Hash the input and compare against the stored expected value.
    pub fn matches(&self, input: &str, stored: &str) -> bool {
        let hashed = self.digest(input);
        if self.ignore_case {
            hashed.eq_ignore_ascii_case(stored)
        } else {
            hashed == stored
        }
    }
}

fn hash_bytes(algorithm: HashAlgorithm, input: &[u8]) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Md5 => Md5::digest(input).to_vec(),
        HashAlgorithm::Sha1 => Sha1::digest(input).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(input).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(input).to_vec(),
    }
}
