//! The user command record and its per-field delta encoding.

use bytestream::{ByteReader, ByteResult, ByteWriter};

/// One tick of player input.
///
/// Commands are delta-encoded against the previous command in a batch; each
/// field is preceded by a one-byte flag and omitted when unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UserCmd {
    /// Monotonic client-assigned number, starting at 1.
    pub command_number: u32,
    /// Client tick the command was generated for.
    pub tick_count: u32,
    pub view_angles: [f32; 3],
    pub forward_move: f32,
    pub side_move: f32,
    pub up_move: f32,
    pub buttons: u32,
    pub weapon_select: u8,
    pub weapon_subtype: u8,
    pub mouse_dx: i16,
    pub mouse_dy: i16,
}

impl UserCmd {
    /// The all-zero command every batch is delta-encoded from.
    pub const NULL: Self = Self {
        command_number: 0,
        tick_count: 0,
        view_angles: [0.0; 3],
        forward_move: 0.0,
        side_move: 0.0,
        up_move: 0.0,
        buttons: 0,
        weapon_select: 0,
        weapon_subtype: 0,
        mouse_dx: 0,
        mouse_dy: 0,
    };

    /// Writes `self` as a delta from `from`.
    ///
    /// `command_number` and `tick_count` are omitted when they equal
    /// `from + 1`; every other field is omitted when equal to `from`.
    pub fn write_delta(&self, from: &Self, out: &mut ByteWriter) {
        write_if(
            out,
            self.command_number != from.command_number.wrapping_add(1),
            |out| out.write_u32(self.command_number),
        );
        write_if(
            out,
            self.tick_count != from.tick_count.wrapping_add(1),
            |out| out.write_u32(self.tick_count),
        );
        write_if(out, self.view_angles != from.view_angles, |out| {
            out.write_f32_array(self.view_angles);
        });
        write_if(out, self.forward_move != from.forward_move, |out| {
            out.write_f32(self.forward_move);
        });
        write_if(out, self.side_move != from.side_move, |out| {
            out.write_f32(self.side_move);
        });
        write_if(out, self.up_move != from.up_move, |out| {
            out.write_f32(self.up_move);
        });
        write_if(out, self.buttons != from.buttons, |out| {
            out.write_u32(self.buttons);
        });

        let weapon_changed =
            self.weapon_select != from.weapon_select || self.weapon_subtype != from.weapon_subtype;
        write_if(out, weapon_changed, |out| {
            out.write_u8(self.weapon_select);
            write_if(out, self.weapon_subtype != from.weapon_subtype, |out| {
                out.write_u8(self.weapon_subtype);
            });
        });

        write_if(out, self.mouse_dx != from.mouse_dx, |out| {
            out.write_i16(self.mouse_dx);
        });
        write_if(out, self.mouse_dy != from.mouse_dy, |out| {
            out.write_i16(self.mouse_dy);
        });
    }

    /// Reads a command delta-encoded against `from`.
    pub fn read_delta(reader: &mut ByteReader<'_>, from: &Self) -> ByteResult<Self> {
        let mut cmd = *from;

        cmd.command_number = if read_flag(reader)? {
            reader.read_u32()?
        } else {
            from.command_number.wrapping_add(1)
        };
        cmd.tick_count = if read_flag(reader)? {
            reader.read_u32()?
        } else {
            from.tick_count.wrapping_add(1)
        };

        if read_flag(reader)? {
            cmd.view_angles = reader.read_f32_array()?;
        }
        if read_flag(reader)? {
            cmd.forward_move = reader.read_f32()?;
        }
        if read_flag(reader)? {
            cmd.side_move = reader.read_f32()?;
        }
        if read_flag(reader)? {
            cmd.up_move = reader.read_f32()?;
        }
        if read_flag(reader)? {
            cmd.buttons = reader.read_u32()?;
        }
        if read_flag(reader)? {
            cmd.weapon_select = reader.read_u8()?;
            if read_flag(reader)? {
                cmd.weapon_subtype = reader.read_u8()?;
            }
        }
        if read_flag(reader)? {
            cmd.mouse_dx = reader.read_i16()?;
        }
        if read_flag(reader)? {
            cmd.mouse_dy = reader.read_i16()?;
        }

        Ok(cmd)
    }

    /// The command with all movement and buttons cleared, used while the
    /// simulation is paused.
    #[must_use]
    pub fn neutralized(mut self, view_angles: [f32; 3]) -> Self {
        self.buttons = 0;
        self.forward_move = 0.0;
        self.side_move = 0.0;
        self.up_move = 0.0;
        self.view_angles = view_angles;
        self
    }
}

fn write_if(out: &mut ByteWriter, changed: bool, write: impl FnOnce(&mut ByteWriter)) {
    out.write_u8(u8::from(changed));
    if changed {
        write(out);
    }
}

// Any nonzero byte counts as set.
fn read_flag(reader: &mut ByteReader<'_>) -> ByteResult<bool> {
    Ok(reader.read_u8()? != 0)
}
