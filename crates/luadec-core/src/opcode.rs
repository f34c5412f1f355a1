use std::convert::TryFrom;
use std::fmt;

/// Operator kinds, numbered like the Lua 5.0 virtual machine.
///
/// Values outside the table decode to [`OperatorKind::Generic`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Move = 0,
    LoadK = 1,
    LoadBool = 2,
    LoadNil = 3,
    GetUpval = 4,
    GetGlobal = 5,
    GetTable = 6,
    SetGlobal = 7,
    SetUpval = 8,
    SetTable = 9,
    NewTable = 10,
    SelfOp = 11,
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Pow = 16,
    Unm = 17,
    Not = 18,
    Concat = 19,
    Jmp = 20,
    Eq = 21,
    Lt = 22,
    Le = 23,
    Test = 24,
    Call = 25,
    TailCall = 26,
    Return = 27,
    ForLoop = 28,
    TForLoop = 29,
    TForPrep = 30,
    SetList = 31,
    SetListO = 32,
    Close = 33,
    Closure = 34,
    Generic = u32::MAX,
}

impl TryFrom<u32> for OperatorKind {
    type Error = ();

    fn try_from(v: u32) -> core::result::Result<Self, Self::Error> {
        use OperatorKind::*;
        Ok(match v {
            0 => Move,
            1 => LoadK,
            2 => LoadBool,
            3 => LoadNil,
            4 => GetUpval,
            5 => GetGlobal,
            6 => GetTable,
            7 => SetGlobal,
            8 => SetUpval,
            9 => SetTable,
            10 => NewTable,
            11 => SelfOp,
            12 => Add,
            13 => Sub,
            14 => Mul,
            15 => Div,
            16 => Pow,
            17 => Unm,
            18 => Not,
            19 => Concat,
            20 => Jmp,
            21 => Eq,
            22 => Lt,
            23 => Le,
            24 => Test,
            25 => Call,
            26 => TailCall,
            27 => Return,
            28 => ForLoop,
            29 => TForLoop,
            30 => TForPrep,
            31 => SetList,
            32 => SetListO,
            33 => Close,
            34 => Closure,
            _ => return Err(()),
        })
    }
}

impl OperatorKind {
    #[inline]
    pub fn from_opcode(op: u32) -> Self {
        Self::try_from(op).unwrap_or(OperatorKind::Generic)
    }

    pub fn mnemonic(self) -> &'static str {
        use OperatorKind::*;
        match self {
            Move => "MOVE",
            LoadK => "LOADK",
            LoadBool => "LOADBOOL",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            GetGlobal => "GETGLOBAL",
            GetTable => "GETTABLE",
            SetGlobal => "SETGLOBAL",
            SetUpval => "SETUPVAL",
            SetTable => "SETTABLE",
            NewTable => "NEWTABLE",
            SelfOp => "SELF",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Pow => "POW",
            Unm => "UNM",
            Not => "NOT",
            Concat => "CONCAT",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            Test => "TEST",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            ForLoop => "FORLOOP",
            TForLoop => "TFORLOOP",
            TForPrep => "TFORPREP",
            SetList => "SETLIST",
            SetListO => "SETLISTO",
            Close => "CLOSE",
            Closure => "CLOSURE",
            Generic => "UNKNOWN",
        }
    }

    /// Comparisons and `TEST`: the instruction after them is a `JMP` that is
    /// either taken or skipped.
    #[inline]
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            OperatorKind::Eq | OperatorKind::Lt | OperatorKind::Le | OperatorKind::Test
        )
    }

    /// Operand shape, used by the listing.
    pub fn format(self) -> OperandFormat {
        use OperatorKind::*;
        match self {
            LoadK | GetGlobal | SetGlobal | SetList | SetListO | Closure => OperandFormat::ABx,
            Jmp | ForLoop | TForPrep => OperandFormat::AsBx,
            _ => OperandFormat::ABC,
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandFormat {
    ABC,
    ABx,
    AsBx,
}
