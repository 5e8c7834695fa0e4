use std::fmt;

/// Concrete representation of a value or of a column.
///
/// `Null` only ever classifies a value; a column is always created with a
/// non-null kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Int32,
    Int64,
    Float64,
    Timestamp,
    String,
    Structured,
}

impl Kind {
    /// Position on the numeric widening lattice `Int32 < Int64 < Float64`.
    fn numeric_rank(self) -> Option<u8> {
        match self {
            Kind::Int32 => Some(0),
            Kind::Int64 => Some(1),
            Kind::Float64 => Some(2),
            _ => None,
        }
    }

    /// Promotion lattice: the kind a column of kind `self` must take to also
    /// hold a value of kind `incoming`.
    ///
    /// | current \ incoming | Null | same | wider numeric | anything else |
    /// |--------------------|------|------|---------------|---------------|
    /// | any                | self | self | incoming      | String        |
    ///
    /// A narrower numeric value keeps the wider column kind.
    pub fn join(self, incoming: Kind) -> Kind {
        if incoming == Kind::Null || incoming == self {
            return self;
        }
        if self == Kind::Null {
            return incoming;
        }
        match (self.numeric_rank(), incoming.numeric_rank()) {
            (Some(a), Some(b)) => {
                if b > a {
                    incoming
                } else {
                    self
                }
            }
            _ => Kind::String,
        }
    }

    /// Whether a column of kind `self` can absorb `incoming` without changing
    /// representation (the value is cast on append).
    pub fn absorbs(self, incoming: Kind) -> bool {
        self.join(incoming) == self
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Float64 => "float64",
            Kind::Timestamp => "timestamp",
            Kind::String => "string",
            Kind::Structured => "structured",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Kind; 8] = [
        Kind::Null,
        Kind::Bool,
        Kind::Int32,
        Kind::Int64,
        Kind::Float64,
        Kind::Timestamp,
        Kind::String,
        Kind::Structured,
    ];

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Kind::Int32.join(Kind::Int64), Kind::Int64);
        assert_eq!(Kind::Int32.join(Kind::Float64), Kind::Float64);
        assert_eq!(Kind::Int64.join(Kind::Float64), Kind::Float64);
        assert_eq!(Kind::Float64.join(Kind::Int32), Kind::Float64);
        assert_eq!(Kind::Int64.join(Kind::Int32), Kind::Int64);
    }

    #[test]
    fn test_null_never_decides() {
        for k in ALL {
            assert_eq!(k.join(Kind::Null), k);
        }
    }

    #[test]
    fn test_incompatible_falls_back_to_string() {
        assert_eq!(Kind::Int32.join(Kind::String), Kind::String);
        assert_eq!(Kind::Bool.join(Kind::Int64), Kind::String);
        assert_eq!(Kind::Timestamp.join(Kind::Float64), Kind::String);
        assert_eq!(Kind::String.join(Kind::Structured), Kind::String);
        assert_eq!(Kind::Bool.join(Kind::Structured), Kind::String);
        assert_eq!(Kind::Structured.join(Kind::Structured), Kind::Structured);
    }

    #[test]
    fn test_absorbs() {
        assert!(Kind::Float64.absorbs(Kind::Int32));
        assert!(Kind::Int64.absorbs(Kind::Null));
        assert!(Kind::String.absorbs(Kind::Bool));
        assert!(!Kind::Int32.absorbs(Kind::Int64));
        assert!(!Kind::Bool.absorbs(Kind::String));
    }

    #[test]
    fn test_join_never_narrows() {
        for a in ALL.into_iter().filter(|k| *k != Kind::Null) {
            for b in ALL {
                let joined = a.join(b);
                // once joined, the column absorbs both sides
                assert!(joined.absorbs(a), "{joined} must absorb {a}");
                assert!(joined.absorbs(b), "{joined} must absorb {b}");
            }
        }
    }
}
