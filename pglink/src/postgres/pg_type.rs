/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// A type that have corresponding postgres oid.
///
/// Parameters are always sent in text format, the oid only tells the backend how to
/// interpret that text. Oid zero leaves the type unspecified, the backend infers it.
pub trait PgType {
    const OID: Oid;
}

/// Let the backend infer the parameter type.
pub const UNSPECIFIED: Oid = 0;

macro_rules! pg_type {
    ($($ty:ty => $oid:literal,)*) => {
        $(
            impl PgType for $ty {
                const OID: Oid = $oid;
            }
        )*
    };
}

pg_type! {
    bool => 16,
    i64 => 20,
    i16 => 21,
    i32 => 23,
    f32 => 700,
    f64 => 701,
}
