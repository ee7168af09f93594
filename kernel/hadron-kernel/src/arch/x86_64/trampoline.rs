//! Const-generic interrupt trampolines.
//!
//! One monomorphized `extern "x86-interrupt"` function per vector, rather
//! than a hand-written naked-asm stub per line. Each trampoline only needs
//! to forward the vector number (baked in at compile time via the const
//! generic) and the CPU-pushed frame into the portable dispatcher in
//! [`crate::interrupts`]; the compiler generates the entry/exit register
//! save and `iretq` for us.

use hadron_core::arch::x86_64::structures::idt::{HandlerFunc, HandlerFuncWithErrCode, InterruptStackFrame};

/// Trampoline for IRQ/IPI vectors (32-255): no CPU-pushed error code.
extern "x86-interrupt" fn irq_trampoline<const V: u8>(frame: InterruptStackFrame) {
    crate::interrupts::dispatch(V, frame.instruction_pointer.as_u64(), 0);
}

/// Trampoline for exception vectors that do not push an error code.
extern "x86-interrupt" fn exception_trampoline<const V: u8>(frame: InterruptStackFrame) {
    crate::interrupts::dispatch(V, frame.instruction_pointer.as_u64(), 0);
}

/// Trampoline for exception vectors that push an error code.
extern "x86-interrupt" fn exception_trampoline_err<const V: u8>(
    frame: InterruptStackFrame,
    error_code: u64,
) {
    crate::interrupts::dispatch(V, frame.instruction_pointer.as_u64(), error_code);
}

/// One [`HandlerFunc`] per vector 32-255, indexed by `vector - 32`.
///
/// Built at compile time via const-generic monomorphization: `TRAMPOLINES[i]
/// == irq_trampoline::<{i + 32}>`.
pub static IRQ_TRAMPOLINES: [HandlerFunc; 224] = [
    irq_trampoline::<32>, irq_trampoline::<33>, irq_trampoline::<34>, irq_trampoline::<35>,
    irq_trampoline::<36>, irq_trampoline::<37>, irq_trampoline::<38>, irq_trampoline::<39>,
    irq_trampoline::<40>, irq_trampoline::<41>, irq_trampoline::<42>, irq_trampoline::<43>,
    irq_trampoline::<44>, irq_trampoline::<45>, irq_trampoline::<46>, irq_trampoline::<47>,
    irq_trampoline::<48>, irq_trampoline::<49>, irq_trampoline::<50>, irq_trampoline::<51>,
    irq_trampoline::<52>, irq_trampoline::<53>, irq_trampoline::<54>, irq_trampoline::<55>,
    irq_trampoline::<56>, irq_trampoline::<57>, irq_trampoline::<58>, irq_trampoline::<59>,
    irq_trampoline::<60>, irq_trampoline::<61>, irq_trampoline::<62>, irq_trampoline::<63>,
    irq_trampoline::<64>, irq_trampoline::<65>, irq_trampoline::<66>, irq_trampoline::<67>,
    irq_trampoline::<68>, irq_trampoline::<69>, irq_trampoline::<70>, irq_trampoline::<71>,
    irq_trampoline::<72>, irq_trampoline::<73>, irq_trampoline::<74>, irq_trampoline::<75>,
    irq_trampoline::<76>, irq_trampoline::<77>, irq_trampoline::<78>, irq_trampoline::<79>,
    irq_trampoline::<80>, irq_trampoline::<81>, irq_trampoline::<82>, irq_trampoline::<83>,
    irq_trampoline::<84>, irq_trampoline::<85>, irq_trampoline::<86>, irq_trampoline::<87>,
    irq_trampoline::<88>, irq_trampoline::<89>, irq_trampoline::<90>, irq_trampoline::<91>,
    irq_trampoline::<92>, irq_trampoline::<93>, irq_trampoline::<94>, irq_trampoline::<95>,
    irq_trampoline::<96>, irq_trampoline::<97>, irq_trampoline::<98>, irq_trampoline::<99>,
    irq_trampoline::<100>, irq_trampoline::<101>, irq_trampoline::<102>, irq_trampoline::<103>,
    irq_trampoline::<104>, irq_trampoline::<105>, irq_trampoline::<106>, irq_trampoline::<107>,
    irq_trampoline::<108>, irq_trampoline::<109>, irq_trampoline::<110>, irq_trampoline::<111>,
    irq_trampoline::<112>, irq_trampoline::<113>, irq_trampoline::<114>, irq_trampoline::<115>,
    irq_trampoline::<116>, irq_trampoline::<117>, irq_trampoline::<118>, irq_trampoline::<119>,
    irq_trampoline::<120>, irq_trampoline::<121>, irq_trampoline::<122>, irq_trampoline::<123>,
    irq_trampoline::<124>, irq_trampoline::<125>, irq_trampoline::<126>, irq_trampoline::<127>,
    irq_trampoline::<128>, irq_trampoline::<129>, irq_trampoline::<130>, irq_trampoline::<131>,
    irq_trampoline::<132>, irq_trampoline::<133>, irq_trampoline::<134>, irq_trampoline::<135>,
    irq_trampoline::<136>, irq_trampoline::<137>, irq_trampoline::<138>, irq_trampoline::<139>,
    irq_trampoline::<140>, irq_trampoline::<141>, irq_trampoline::<142>, irq_trampoline::<143>,
    irq_trampoline::<144>, irq_trampoline::<145>, irq_trampoline::<146>, irq_trampoline::<147>,
    irq_trampoline::<148>, irq_trampoline::<149>, irq_trampoline::<150>, irq_trampoline::<151>,
    irq_trampoline::<152>, irq_trampoline::<153>, irq_trampoline::<154>, irq_trampoline::<155>,
    irq_trampoline::<156>, irq_trampoline::<157>, irq_trampoline::<158>, irq_trampoline::<159>,
    irq_trampoline::<160>, irq_trampoline::<161>, irq_trampoline::<162>, irq_trampoline::<163>,
    irq_trampoline::<164>, irq_trampoline::<165>, irq_trampoline::<166>, irq_trampoline::<167>,
    irq_trampoline::<168>, irq_trampoline::<169>, irq_trampoline::<170>, irq_trampoline::<171>,
    irq_trampoline::<172>, irq_trampoline::<173>, irq_trampoline::<174>, irq_trampoline::<175>,
    irq_trampoline::<176>, irq_trampoline::<177>, irq_trampoline::<178>, irq_trampoline::<179>,
    irq_trampoline::<180>, irq_trampoline::<181>, irq_trampoline::<182>, irq_trampoline::<183>,
    irq_trampoline::<184>, irq_trampoline::<185>, irq_trampoline::<186>, irq_trampoline::<187>,
    irq_trampoline::<188>, irq_trampoline::<189>, irq_trampoline::<190>, irq_trampoline::<191>,
    irq_trampoline::<192>, irq_trampoline::<193>, irq_trampoline::<194>, irq_trampoline::<195>,
    irq_trampoline::<196>, irq_trampoline::<197>, irq_trampoline::<198>, irq_trampoline::<199>,
    irq_trampoline::<200>, irq_trampoline::<201>, irq_trampoline::<202>, irq_trampoline::<203>,
    irq_trampoline::<204>, irq_trampoline::<205>, irq_trampoline::<206>, irq_trampoline::<207>,
    irq_trampoline::<208>, irq_trampoline::<209>, irq_trampoline::<210>, irq_trampoline::<211>,
    irq_trampoline::<212>, irq_trampoline::<213>, irq_trampoline::<214>, irq_trampoline::<215>,
    irq_trampoline::<216>, irq_trampoline::<217>, irq_trampoline::<218>, irq_trampoline::<219>,
    irq_trampoline::<220>, irq_trampoline::<221>, irq_trampoline::<222>, irq_trampoline::<223>,
    irq_trampoline::<224>, irq_trampoline::<225>, irq_trampoline::<226>, irq_trampoline::<227>,
    irq_trampoline::<228>, irq_trampoline::<229>, irq_trampoline::<230>, irq_trampoline::<231>,
    irq_trampoline::<232>, irq_trampoline::<233>, irq_trampoline::<234>, irq_trampoline::<235>,
    irq_trampoline::<236>, irq_trampoline::<237>, irq_trampoline::<238>, irq_trampoline::<239>,
    irq_trampoline::<240>, irq_trampoline::<241>, irq_trampoline::<242>, irq_trampoline::<243>,
    irq_trampoline::<244>, irq_trampoline::<245>, irq_trampoline::<246>, irq_trampoline::<247>,
    irq_trampoline::<248>, irq_trampoline::<249>, irq_trampoline::<250>, irq_trampoline::<251>,
    irq_trampoline::<252>, irq_trampoline::<253>, irq_trampoline::<254>, irq_trampoline::<255>,
];

/// Vectors 0-31 that the CPU defines as pushing an error code.
pub const HAS_ERROR_CODE: [bool; 32] = {
    let mut table = [false; 32];
    table[8] = true; // double fault
    table[10] = true; // invalid TSS
    table[11] = true; // segment not present
    table[12] = true; // stack-segment fault
    table[13] = true; // general protection
    table[14] = true; // page fault
    table[17] = true; // alignment check
    table[21] = true; // control protection
    table[29] = true; // VMM communication
    table[30] = true; // security exception
    table
};

/// Handler function for a no-error-code exception at vector `V`.
pub fn exception_handler<const V: u8>() -> HandlerFunc {
    exception_trampoline::<V>
}

/// Handler function for an error-code exception at vector `V`.
pub fn exception_handler_err<const V: u8>() -> HandlerFuncWithErrCode {
    exception_trampoline_err::<V>
}
