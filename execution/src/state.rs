use anyhow::Result;
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use commonware_cryptography::ed25519::PublicKey;
use qchess_types::{execution::Account, Game, GameError, GameId, Key, Value};
use std::{collections::HashMap, future::Future};

pub trait State {
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Value>>>;
    fn insert(&mut self, key: Key, value: Value) -> impl Future<Output = Result<()>>;
    fn delete(&mut self, key: &Key) -> impl Future<Output = Result<()>>;

    /// Apply a batch of changes. Implementations backed by durable storage should override this
    /// so the batch lands all at once.
    fn apply(&mut self, changes: Vec<(Key, Status)>) -> impl Future<Output = Result<()>> {
        async {
            for (key, status) in changes {
                match status {
                    Status::Update(value) => self.insert(key, value).await?,
                    Status::Delete => self.delete(&key).await?,
                }
            }
            Ok(())
        }
    }
}

/// In-memory store.
#[derive(Default)]
pub struct Memory {
    state: HashMap<Key, Value>,
}

impl Memory {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl State for Memory {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.state.insert(key, value);
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.state.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}

impl Write for Status {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Status::Update(value) => {
                0u8.write(writer);
                value.write(writer);
            }
            Status::Delete => 1u8.write(writer),
        }
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Status::Update(Value::read(reader)?)),
            1 => Ok(Status::Delete),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1 + match self {
            Status::Update(value) => value.encode_size(),
            Status::Delete => 0,
        }
    }
}

pub async fn nonce<S: State>(state: &S, public: &PublicKey) -> Result<u64> {
    Ok(load_account(state, public).await?.nonce)
}

pub(crate) async fn load_account<S: State>(state: &S, public: &PublicKey) -> Result<Account> {
    Ok(match state.get(&Key::Account(public.clone())).await? {
        Some(Value::Account(account)) => account,
        _ => Account::default(),
    })
}

pub(crate) fn validate_and_increment_nonce(
    account: &mut Account,
    provided_nonce: u64,
) -> Result<(), GameError> {
    if account.nonce != provided_nonce {
        return Err(GameError::NonceMismatch {
            expected: account.nonce,
            got: provided_nonce,
        });
    }
    account.nonce += 1;
    Ok(())
}

pub(crate) async fn load_balance<S: State>(state: &S, public: &PublicKey) -> Result<u64> {
    Ok(match state.get(&Key::Balance(public.clone())).await? {
        Some(Value::Balance(balance)) => balance,
        _ => 0,
    })
}

pub(crate) async fn load_game<S: State>(state: &S, id: GameId) -> Result<Option<Game>> {
    Ok(match state.get(&Key::Game(id)).await? {
        Some(Value::Game(game)) => Some(game),
        Some(other) => anyhow::bail!("unexpected value under game key {id}: {other:?}"),
        None => None,
    })
}

/// Id the next created game receives.
pub(crate) async fn load_counter<S: State>(state: &S) -> Result<GameId> {
    Ok(match state.get(&Key::GameCounter).await? {
        Some(Value::GameCounter(next)) => next,
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_account_keypair;
    use commonware_codec::Encode;

    #[tokio::test]
    async fn apply_updates_and_deletes() {
        let (_, public) = create_account_keypair(1);
        let mut state = Memory::default();
        state
            .apply(vec![
                (Key::Balance(public.clone()), Status::Update(Value::Balance(5))),
                (Key::GameCounter, Status::Update(Value::GameCounter(3))),
            ])
            .await
            .expect("apply");
        assert_eq!(load_balance(&state, &public).await.expect("balance"), 5);
        assert_eq!(load_counter(&state).await.expect("counter"), 3);

        state
            .apply(vec![(Key::Balance(public.clone()), Status::Delete)])
            .await
            .expect("apply");
        assert_eq!(load_balance(&state, &public).await.expect("balance"), 0);
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn nonce_must_match_and_advances() {
        let (_, public) = create_account_keypair(1);
        let state = Memory::default();
        let mut account = load_account(&state, &public).await.expect("account");
        assert_eq!(
            validate_and_increment_nonce(&mut account, 1),
            Err(GameError::NonceMismatch {
                expected: 0,
                got: 1
            })
        );
        validate_and_increment_nonce(&mut account, 0).expect("nonce 0");
        assert_eq!(account.nonce, 1);
    }

    #[test]
    fn status_codec() {
        let update = Status::Update(Value::Balance(7));
        let encoded = update.encode();
        assert_eq!(encoded.len(), update.encode_size());
        assert_eq!(Status::read(&mut &encoded[..]).expect("decode"), update);
        assert_eq!(Status::Delete.encode().as_ref(), &[1u8]);
    }
}
