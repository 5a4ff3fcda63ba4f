/// The terminal result of a settled [`Promise`](crate::Promise).
///
/// A pending promise has no outcome at all; see
/// [`Promise::peek`](crate::Promise::peek).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Outcome<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    /// The fulfillment value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fulfilled(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<&E> {
        match self {
            Outcome::Fulfilled(_) => None,
            Outcome::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        self.into()
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Outcome::Fulfilled(_) => "fulfilled",
            Outcome::Rejected(_) => "rejected",
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Fulfilled(value),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        match outcome {
            Outcome::Fulfilled(value) => Ok(value),
            Outcome::Rejected(reason) => Err(reason),
        }
    }
}
