//! Endereçamento de destino na mesh.
//!
//! Um nó é identificado por um número de 32 bits, escrito como decimal
//! (`2658499212`) ou hexadecimal com prefixo `!` (`!9e757a8c`).
//! `0xFFFFFFFF` é o sentinela de broadcast.

use std::fmt;
use std::str::FromStr;

/// Número de nó que significa "todos os nós alcançáveis".
pub const BROADCAST_NUM: u32 = 0xFFFF_FFFF;

/// Destino de uma mensagem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Broadcast,
    Node(u32),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("id de nó vazio")]
    Empty,

    #[error("id de nó inválido: {0:?} (esperado !xxxxxxxx, ^all ou decimal)")]
    Malformed(String),

    #[error("nó 0 não é um destino válido")]
    Zero,
}

impl Target {
    /// Constrói a partir do número bruto do nó.
    pub fn from_num(num: u32) -> Result<Self, TargetError> {
        match num {
            0 => Err(TargetError::Zero),
            BROADCAST_NUM => Ok(Target::Broadcast),
            n => Ok(Target::Node(n)),
        }
    }

    /// Número usado no campo `to` do pacote.
    pub fn node_num(&self) -> u32 {
        match self {
            Target::Broadcast => BROADCAST_NUM,
            Target::Node(n) => *n,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Target::Broadcast)
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TargetError::Empty);
        }
        if s.eq_ignore_ascii_case("^all") {
            return Ok(Target::Broadcast);
        }

        let num = if let Some(hex) = s.strip_prefix('!') {
            if hex.is_empty() || hex.len() > 8 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(TargetError::Malformed(s.into()));
            }
            u32::from_str_radix(hex, 16).map_err(|_| TargetError::Malformed(s.into()))?
        } else {
            if !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(TargetError::Malformed(s.into()));
            }
            s.parse::<u32>().map_err(|_| TargetError::Malformed(s.into()))?
        };

        Target::from_num(num)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}", self.node_num())
    }
}
