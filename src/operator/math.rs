// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shorthands that create and wire the common built-in operators.

use super::{Input, Operator};
use crate::errors::Result;
use crate::server::Server;

/// `a + b` for fields, fields containers or a field and a double.
pub async fn add<'a>(
    server: &Server,
    a: impl Into<Input<'a>>,
    b: impl Into<Input<'a>>,
) -> Result<Operator> {
    binary(server, "add", a, b).await
}

/// `field * factor`.
pub async fn scale<'a>(server: &Server, field: impl Into<Input<'a>>, factor: f64) -> Result<Operator> {
    let op = Operator::new(server, "scale").await?;
    op.connect(0, field).await?;
    op.connect(1, factor).await?;
    Ok(op)
}

/// Component-wise minimum (output 0) and maximum (output 1) over entities.
pub async fn min_max<'a>(server: &Server, field: impl Into<Input<'a>>) -> Result<Operator> {
    let op = Operator::new(server, "min_max").await?;
    op.connect(0, field).await?;
    Ok(op)
}

/// `fields` restricted, and reordered, to the ids of `scoping`.
pub async fn rescope<'a>(
    server: &Server,
    fields: impl Into<Input<'a>>,
    scoping: impl Into<Input<'a>>,
) -> Result<Operator> {
    binary(server, "rescope", fields, scoping).await
}

/// Scoping set operations: output 0 of `intersect` holds the ids in both,
/// output 1 the ids only in `a`. `union` keeps the order of `a`, then `b`.
pub async fn intersect<'a>(
    server: &Server,
    a: impl Into<Input<'a>>,
    b: impl Into<Input<'a>>,
) -> Result<Operator> {
    binary(server, "scoping::intersect", a, b).await
}

pub async fn union<'a>(
    server: &Server,
    a: impl Into<Input<'a>>,
    b: impl Into<Input<'a>>,
) -> Result<Operator> {
    binary(server, "scoping::union", a, b).await
}

async fn binary<'a>(
    server: &Server,
    name: &str,
    a: impl Into<Input<'a>>,
    b: impl Into<Input<'a>>,
) -> Result<Operator> {
    let op = Operator::new(server, name).await?;
    op.connect(0, a).await?;
    op.connect(1, b).await?;
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::data::{Field, Scoping};
    use crate::remote::Remote;

    #[tokio::test]
    async fn test_builders_compose() {
        let server = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        let field = Field::scalar(Scoping::nodal(vec![1, 2, 3]), vec![1.0, -4.0, 2.0]).unwrap();
        let field = Remote::create(&server, field).await.unwrap();

        let doubled = scale(&server, &field, 2.0).await.unwrap();
        let sum = add(&server, doubled.output_ref(0), &field).await.unwrap();
        let extremes = min_max(&server, sum.output_ref(0)).await.unwrap();
        let min: Field = extremes.get_output(0).await.unwrap();
        let max: Field = extremes.get_output(1).await.unwrap();
        assert_eq!(min.data(), &[-12.0]);
        assert_eq!(max.data(), &[6.0]);

        let picked = rescope(&server, sum.output_ref(0), Scoping::nodal(vec![3, 1]))
            .await
            .unwrap();
        let picked: Field = picked.get_output(0).await.unwrap();
        assert_eq!(picked.data(), &[6.0, 3.0]);
    }

    #[tokio::test]
    async fn test_scoping_set_operations() {
        let server = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        let a = Scoping::nodal(vec![5, 1, 9, 3]);
        let b = Scoping::nodal(vec![3, 4, 5]);

        let both = intersect(&server, a.clone(), b.clone()).await.unwrap();
        let common: Scoping = both.get_output(0).await.unwrap();
        let only_a: Scoping = both.get_output(1).await.unwrap();
        assert_eq!(common.ids(), &[5, 3]);
        assert_eq!(only_a.ids(), &[1, 9]);

        let all: Scoping = union(&server, a, b).await.unwrap().get_output(0).await.unwrap();
        assert_eq!(all.ids(), &[5, 1, 9, 3, 4]);
    }
}
