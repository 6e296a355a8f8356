//! File-based keyring backend
//!
//! Each key is stored as `<name>.json` inside the keyring directory. The
//! ed25519 seed is encrypted with AES-256-GCM under a key derived from the
//! keyring password with Argon2.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tessera_crypto::{sign_message, PrivateKey, PublicKey};
use tessera_types::Network;
use tokio::fs;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::backends::StoredKey;
use crate::{decode_private_key, validate_name, KeyInfo, Keyring, KeyringError};

const KEY_TYPE: &str = "ed25519";
const SALT_LEN: usize = 16;

/// File-based keyring backend
pub struct FileKeyring {
    dir: PathBuf,
    network: Network,
    /// Decrypted keys loaded at open time
    keys: BTreeMap<String, StoredKey>,
    password: SecureString,
}

/// Securely stored string that gets zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct SecureString(String);

/// Encrypted key file format
#[derive(Serialize, Deserialize)]
struct EncryptedKeyFile {
    name: String,
    key_type: String,
    /// base64 ciphertext of the 32 byte seed
    encrypted_data: String,
    nonce: String,
    salt: String,
    pubkey: PublicKey,
    address: String,
}

impl FileKeyring {
    /// Open (or create) a keyring directory and decrypt every key in it
    pub async fn new(
        dir: impl AsRef<Path>,
        password: String,
        network: Network,
    ) -> Result<Self, KeyringError> {
        let dir = dir.as_ref().to_path_buf();

        fs::create_dir_all(&dir).await.map_err(|e| {
            KeyringError::BackendError(format!("Failed to create keyring directory: {e}"))
        })?;

        let mut keyring = FileKeyring {
            dir,
            network,
            keys: BTreeMap::new(),
            password: SecureString(password),
        };

        keyring.load_keys().await?;

        Ok(keyring)
    }

    /// Directory holding the key files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn load_keys(&mut self) -> Result<(), KeyringError> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            KeyringError::BackendError(format!("Failed to read keyring directory: {e}"))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            KeyringError::BackendError(format!("Failed to read directory entry: {e}"))
        })? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };

            // One unreadable key must not lock the owner out of the rest
            if let Err(e) = self.load_key(&name).await {
                warn!(name = %name, error = %e, "Failed to load key");
            }
        }

        debug!(count = self.keys.len(), dir = %self.dir.display(), "Loaded keyring");
        Ok(())
    }

    async fn load_key(&mut self, name: &str) -> Result<(), KeyringError> {
        let data = fs::read_to_string(self.key_path(name))
            .await
            .map_err(|e| KeyringError::BackendError(format!("Failed to read key file: {e}")))?;

        let encrypted_file: EncryptedKeyFile = serde_json::from_str(&data)
            .map_err(|e| KeyringError::BackendError(format!("Failed to parse key file: {e}")))?;

        let privkey = self.decrypt_key(&encrypted_file)?;
        if privkey.public_key() != encrypted_file.pubkey {
            return Err(KeyringError::BackendError(format!(
                "Public key mismatch in key file: {name}"
            )));
        }

        self.keys
            .insert(name.to_string(), StoredKey::new(privkey, self.network));
        Ok(())
    }

    fn derive_cipher(&self, salt: &[u8]) -> Result<Aes256Gcm, KeyringError> {
        let mut key_bytes = [0u8; 32];
        Argon2::default()
            .hash_password_into(self.password.0.as_bytes(), salt, &mut key_bytes)
            .map_err(|e| KeyringError::BackendError(format!("Failed to hash password: {e}")))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        key_bytes.zeroize();
        Ok(cipher)
    }

    fn encrypt_key(
        &self,
        name: &str,
        privkey: &PrivateKey,
    ) -> Result<EncryptedKeyFile, KeyringError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let cipher = self.derive_cipher(&salt)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut seed = privkey.to_bytes();
        let ciphertext = cipher.encrypt(&nonce, seed.as_ref());
        seed.zeroize();
        let ciphertext = ciphertext
            .map_err(|e| KeyringError::BackendError(format!("Failed to encrypt key: {e}")))?;

        let pubkey = privkey.public_key();
        Ok(EncryptedKeyFile {
            name: name.to_string(),
            key_type: KEY_TYPE.to_string(),
            encrypted_data: general_purpose::STANDARD.encode(&ciphertext),
            nonce: general_purpose::STANDARD.encode(nonce),
            salt: general_purpose::STANDARD.encode(salt),
            pubkey,
            address: pubkey.to_address(self.network).to_string(),
        })
    }

    fn decrypt_key(&self, encrypted_file: &EncryptedKeyFile) -> Result<PrivateKey, KeyringError> {
        if encrypted_file.key_type != KEY_TYPE {
            return Err(KeyringError::BackendError(format!(
                "Unknown key type: {}",
                encrypted_file.key_type
            )));
        }

        let salt = general_purpose::STANDARD
            .decode(&encrypted_file.salt)
            .map_err(|e| KeyringError::BackendError(format!("Invalid salt: {e}")))?;
        let cipher = self.derive_cipher(&salt)?;

        let nonce_bytes = general_purpose::STANDARD
            .decode(&encrypted_file.nonce)
            .map_err(|e| KeyringError::BackendError(format!("Invalid nonce: {e}")))?;
        if nonce_bytes.len() != 12 {
            return Err(KeyringError::BackendError("Invalid nonce length".to_string()));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = general_purpose::STANDARD
            .decode(&encrypted_file.encrypted_data)
            .map_err(|e| KeyringError::BackendError(format!("Invalid encrypted data: {e}")))?;

        let mut plaintext = cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
            KeyringError::BackendError("Failed to decrypt key (wrong password?)".to_string())
        })?;

        let key = PrivateKey::from_bytes(&plaintext)
            .map_err(|e| KeyringError::BackendError(format!("Invalid ed25519 key: {e}")));
        plaintext.zeroize();
        key
    }

    fn key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    async fn save_key(&self, name: &str, privkey: &PrivateKey) -> Result<(), KeyringError> {
        let encrypted_file = self.encrypt_key(name, privkey)?;

        let json = serde_json::to_string_pretty(&encrypted_file)
            .map_err(|e| KeyringError::BackendError(format!("Failed to serialize key: {e}")))?;

        fs::write(self.key_path(name), json)
            .await
            .map_err(|e| KeyringError::BackendError(format!("Failed to write key file: {e}")))?;

        Ok(())
    }

    async fn store(&mut self, name: &str, privkey: PrivateKey) -> Result<KeyInfo, KeyringError> {
        validate_name(name)?;
        if self.keys.contains_key(name) || self.key_path(name).exists() {
            return Err(KeyringError::KeyExists(name.to_string()));
        }

        self.save_key(name, &privkey).await?;

        let stored_key = StoredKey::new(privkey, self.network);
        let info = stored_key.info(name);
        self.keys.insert(name.to_string(), stored_key);
        Ok(info)
    }
}

#[async_trait]
impl Keyring for FileKeyring {
    async fn create_key(&mut self, name: &str) -> Result<KeyInfo, KeyringError> {
        self.store(name, PrivateKey::generate()).await
    }

    async fn import_private_key(
        &mut self,
        name: &str,
        private_key_hex: &str,
    ) -> Result<KeyInfo, KeyringError> {
        let privkey = decode_private_key(private_key_hex)?;
        self.store(name, privkey).await
    }

    async fn list_keys(&self) -> Result<Vec<KeyInfo>, KeyringError> {
        Ok(self
            .keys
            .iter()
            .map(|(name, key)| key.info(name))
            .collect())
    }

    async fn get_key(&self, name: &str) -> Result<KeyInfo, KeyringError> {
        self.keys
            .get(name)
            .map(|key| key.info(name))
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))
    }

    async fn sign(&self, name: &str, data: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let key = self
            .keys
            .get(name)
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))?;

        Ok(sign_message(&key.privkey, data))
    }

    async fn delete_key(&mut self, name: &str) -> Result<(), KeyringError> {
        if self.keys.remove(name).is_none() {
            return Err(KeyringError::KeyNotFound(name.to_string()));
        }

        fs::remove_file(self.key_path(name))
            .await
            .map_err(|e| KeyringError::BackendError(format!("Failed to delete key file: {e}")))?;

        Ok(())
    }
}

impl std::fmt::Debug for FileKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKeyring")
            .field("dir", &self.dir)
            .field("network", &self.network)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tessera_crypto::verify_signature;

    #[tokio::test]
    async fn test_file_keyring_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let mut keyring = FileKeyring::new(temp_dir.path(), "pw".to_string(), Network::Testnet)
            .await
            .unwrap();

        let key_info = keyring.create_key("test_key").await.unwrap();
        assert_eq!(key_info.name, "test_key");
        assert!(temp_dir.path().join("test_key.json").exists());

        let keys = keyring.list_keys().await.unwrap();
        assert_eq!(keys.len(), 1);

        let signature = keyring.sign("test_key", b"hello").await.unwrap();
        verify_signature(&key_info.pubkey, b"hello", &signature).unwrap();

        keyring.delete_key("test_key").await.unwrap();
        assert!(!temp_dir.path().join("test_key.json").exists());
        assert!(keyring.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_keyring_persistence() {
        let temp_dir = TempDir::new().unwrap();

        let original = {
            let mut keyring =
                FileKeyring::new(temp_dir.path(), "pw".to_string(), Network::Testnet)
                    .await
                    .unwrap();
            keyring
                .import_private_key("persistent", &"07".repeat(32))
                .await
                .unwrap()
        };

        let keyring = FileKeyring::new(temp_dir.path(), "pw".to_string(), Network::Testnet)
            .await
            .unwrap();
        let loaded = keyring.get_key("persistent").await.unwrap();
        assert_eq!(loaded.pubkey, original.pubkey);
        assert_eq!(loaded.address, original.address);

        let contents = std::fs::read_to_string(temp_dir.path().join("persistent.json")).unwrap();
        assert!(!contents.contains(&"07".repeat(32)));
        assert!(contents.contains(&original.address.to_string()));
    }

    #[tokio::test]
    async fn test_file_keyring_wrong_password_skips_keys() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut keyring =
                FileKeyring::new(temp_dir.path(), "right".to_string(), Network::Testnet)
                    .await
                    .unwrap();
            keyring.create_key("secret").await.unwrap();
        }

        let mut keyring = FileKeyring::new(temp_dir.path(), "wrong".to_string(), Network::Testnet)
            .await
            .unwrap();
        assert!(matches!(
            keyring.get_key("secret").await,
            Err(KeyringError::KeyNotFound(_))
        ));
        // The file still exists, so the name is taken
        assert!(matches!(
            keyring.create_key("secret").await,
            Err(KeyringError::KeyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_file_keyring_rejects_bad_names() {
        let temp_dir = TempDir::new().unwrap();
        let mut keyring = FileKeyring::new(temp_dir.path(), "pw".to_string(), Network::Testnet)
            .await
            .unwrap();
        assert!(matches!(
            keyring.create_key("../escape").await,
            Err(KeyringError::InvalidName(_))
        ));
    }
}
