use boron_core::env::Definition;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Game Boy registers and flags exposed as builtin symbols. The discriminant
/// doubles as the opaque builtin token carried through the core's symbol
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Register {
    A,
    B,
    C,
    D,
    E,
    F,
    H,
    L,
    AF,
    BC,
    DE,
    HL,
    SP,
    Carry,
    Zero,
    Interrupt,
}

impl Register {
    pub fn name(self) -> &'static str {
        match self {
            Register::A => "a",
            Register::B => "b",
            Register::C => "c",
            Register::D => "d",
            Register::E => "e",
            Register::F => "f",
            Register::H => "h",
            Register::L => "l",
            Register::AF => "af",
            Register::BC => "bc",
            Register::DE => "de",
            Register::HL => "hl",
            Register::SP => "sp",
            Register::Carry => "carry",
            Register::Zero => "zero",
            Register::Interrupt => "interrupt",
        }
    }

    pub const ALL: [Register; 16] = [
        Register::A,
        Register::B,
        Register::C,
        Register::D,
        Register::E,
        Register::F,
        Register::H,
        Register::L,
        Register::AF,
        Register::BC,
        Register::DE,
        Register::HL,
        Register::SP,
        Register::Carry,
        Register::Zero,
        Register::Interrupt,
    ];
}

pub fn builtins() -> Vec<(String, Definition)> {
    Register::ALL
        .iter()
        .map(|&register| {
            (
                register.name().to_string(),
                Definition::builtin(register.into()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        for register in Register::ALL {
            let token: u32 = register.into();
            assert_eq!(Register::try_from(token), Ok(register));
        }
    }
}
