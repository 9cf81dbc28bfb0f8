//! Payload isolation: the copy a message makes before it crosses the wire.
//!
//! A simulated network must not let sender and receiver share mutable state,
//! so every payload type implements [`Isolate`], which produces a
//! value-identical copy that shares nothing with the original. Plain values
//! isolate by cloning; shared-ownership wrappers (`Arc`, `Mutex`) isolate
//! *deeply*, rebuilding their contents instead of sharing them.
//!
//! [`Postcard`] isolates any serde type through a serialize/deserialize round
//! trip, for payloads that are serializable but not cloneable.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{SimError, SimResult};

/// A payload that can be copied for transit.
///
/// The copy must be equal in value to `self` and share no mutable state with
/// it. Failure to isolate is a programming error in the payload type.
pub trait Isolate: Sized {
    fn isolate(&self) -> SimResult<Self>;
}

macro_rules! isolate_by_clone {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Isolate for $ty {
                fn isolate(&self) -> SimResult<Self> {
                    Ok(self.clone())
                }
            }
        )*
    };
}

isolate_by_clone!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, Duration,
);

impl<T: Isolate> Isolate for Option<T> {
    fn isolate(&self) -> SimResult<Self> {
        self.as_ref().map(Isolate::isolate).transpose()
    }
}

impl<T: Isolate, E: Isolate> Isolate for Result<T, E> {
    fn isolate(&self) -> SimResult<Self> {
        Ok(match self {
            Ok(value) => Ok(value.isolate()?),
            Err(error) => Err(error.isolate()?),
        })
    }
}

impl<T: Isolate> Isolate for Box<T> {
    fn isolate(&self) -> SimResult<Self> {
        Ok(Box::new((**self).isolate()?))
    }
}

impl<T: Isolate> Isolate for Vec<T> {
    fn isolate(&self) -> SimResult<Self> {
        self.iter().map(Isolate::isolate).collect()
    }
}

impl<T: Isolate> Isolate for VecDeque<T> {
    fn isolate(&self) -> SimResult<Self> {
        self.iter().map(Isolate::isolate).collect()
    }
}

impl<T: Isolate + Ord> Isolate for BTreeSet<T> {
    fn isolate(&self) -> SimResult<Self> {
        self.iter().map(Isolate::isolate).collect()
    }
}

impl<T: Isolate + Eq + Hash> Isolate for HashSet<T> {
    fn isolate(&self) -> SimResult<Self> {
        self.iter().map(Isolate::isolate).collect()
    }
}

impl<K: Isolate + Ord, V: Isolate> Isolate for BTreeMap<K, V> {
    fn isolate(&self) -> SimResult<Self> {
        self.iter()
            .map(|(k, v)| Ok((k.isolate()?, v.isolate()?)))
            .collect()
    }
}

impl<K: Isolate + Eq + Hash, V: Isolate> Isolate for HashMap<K, V> {
    fn isolate(&self) -> SimResult<Self> {
        self.iter()
            .map(|(k, v)| Ok((k.isolate()?, v.isolate()?)))
            .collect()
    }
}

impl<A: Isolate, B: Isolate> Isolate for (A, B) {
    fn isolate(&self) -> SimResult<Self> {
        Ok((self.0.isolate()?, self.1.isolate()?))
    }
}

impl<A: Isolate, B: Isolate, C: Isolate> Isolate for (A, B, C) {
    fn isolate(&self) -> SimResult<Self> {
        Ok((self.0.isolate()?, self.1.isolate()?, self.2.isolate()?))
    }
}

/// Deep copy: the isolated `Arc` points at a fresh value.
impl<T: Isolate> Isolate for Arc<T> {
    fn isolate(&self) -> SimResult<Self> {
        Ok(Arc::new((**self).isolate()?))
    }
}

/// Deep copy of the guarded value. A poisoned mutex cannot be isolated: its
/// contents may be half-updated.
impl<T: Isolate> Isolate for Mutex<T> {
    fn isolate(&self) -> SimResult<Self> {
        let guard = self
            .lock()
            .map_err(|_| SimError::isolation("mutex poisoned"))?;
        Ok(Mutex::new(guard.isolate()?))
    }
}

/// Isolation by serialization round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Postcard<T>(pub T);

impl<T> Postcard<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> Isolate for Postcard<T> {
    fn isolate(&self) -> SimResult<Self> {
        let bytes = postcard::to_allocvec(&self.0).map_err(SimError::isolation)?;
        let copy = postcard::from_bytes(&bytes).map_err(SimError::isolation)?;
        Ok(Self(copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serializer};

    #[test]
    fn strings_copy_into_new_allocation() {
        let original = String::from("Durand");
        let copy = original.isolate().unwrap();
        assert_eq!(copy, original);
        assert_ne!(copy.as_ptr(), original.as_ptr());
    }

    #[test]
    fn nested_collections_copy_deeply() {
        let mut original = HashMap::new();
        original.insert("accounts".to_string(), vec![vec![1_i64, 2], vec![3]]);
        let copy = original.isolate().unwrap();
        assert_eq!(copy, original);
        assert_ne!(copy["accounts"][0].as_ptr(), original["accounts"][0].as_ptr());
    }

    #[test]
    fn arc_isolates_to_fresh_allocation() {
        let original = Arc::new(Mutex::new(vec![1_u8, 2, 3]));
        let copy = original.isolate().unwrap();
        assert!(!Arc::ptr_eq(&original, &copy));

        original.lock().unwrap().push(4);
        assert_eq!(*copy.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn poisoned_mutex_fails_isolation() {
        let shared = Arc::new(Mutex::new(0_u32));
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(shared.is_poisoned());
        assert!(matches!(shared.isolate(), Err(SimError::Isolation { .. })));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Transfer {
        account: String,
        cents: i64,
    }

    #[test]
    fn postcard_round_trip_copies() {
        let original = Postcard(Transfer {
            account: "Martin".to_string(),
            cents: -1500,
        });
        let copy = original.isolate().unwrap();
        assert_eq!(copy, original);
        assert_ne!(copy.0.account.as_ptr(), original.0.account.as_ptr());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("holds an open handle"))
        }
    }

    impl<'de> Deserialize<'de> for Unserializable {
        fn deserialize<D: serde::Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
            Ok(Self)
        }
    }

    #[test]
    fn postcard_reports_serialization_failure() {
        assert!(matches!(
            Postcard(Unserializable).isolate(),
            Err(SimError::Isolation { .. })
        ));
    }
}
