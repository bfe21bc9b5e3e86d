use core::fmt;

/// Destination bin for a classified object.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bin {
    Red,
    Green,
    Blue,
}

impl Bin {
    pub const ALL: [Bin; 3] = [Bin::Red, Bin::Green, Bin::Blue];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Bin::Red => "Red",
            Bin::Green => "Green",
            Bin::Blue => "Blue",
        }
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Picks the bin for a scaled RGB sample.
///
/// Red needs to beat both other channels strictly. Otherwise green wins unless
/// blue is strictly larger, so green/blue ties and flat greys go to green.
#[must_use]
pub const fn classify(red: u8, green: u8, blue: u8) -> Bin {
    if red > green && red > blue {
        Bin::Red
    } else if green >= blue {
        Bin::Green
    } else {
        Bin::Blue
    }
}
